//! Rowsift kernel library.
//!
//! Schema-driven listing over PostgreSQL: dotted field paths resolved through
//! an entity catalog, filters compiled into SeaQuery statements, and paginated
//! pages with exact totals. The `rowsift` binary is a thin CLI over this crate.

pub mod config;
pub mod db;
pub mod error;
pub mod listing;
pub mod schema;
pub mod state;

pub use error::{ListError, ListOpResult};
pub use schema::{EntitySchema, SchemaRegistry};
pub use state::ListContext;
