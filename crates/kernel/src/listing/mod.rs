//! Listing engine module.
//!
//! This module provides:
//! - list_records / listop: parameter parsing, execution and eager loading
//! - FilterCompiler: search, column, custom and range filters
//! - QueryPlan: immutable SeaQuery-based SQL generation
//! - coerce / parse_date: raw value conversion
//! - wire: the bracketed literal format of `columnFilters` and ranges
//! - projection: field shapes and parent/child forests

pub mod coerce;
pub mod dates;
pub mod filter;
pub mod list_service;
pub mod projection;
pub mod query_builder;
pub mod types;
pub mod wire;

pub use coerce::coerce;
pub use dates::parse_date;
pub use filter::{FilterCompiler, apply_filters};
pub use list_service::{
    CompiledList, compile_list, effective_search_fields, list_records, listop, parse_list_params,
};
pub use projection::{Forest, build_forest, project};
pub use query_builder::QueryPlan;
pub use types::{
    FieldFilter, FilterValue, ListFilters, ListLimits, ListOutcome, ListResponse, ListResult,
    OutputShape, Pagination, TreeShape,
};
