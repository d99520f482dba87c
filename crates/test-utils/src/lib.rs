//! Rowsift test utilities.
//!
//! Helpers for integration testing: the shop schema catalog, fixture rows,
//! a recording execution backend, a seeded PostgreSQL fixture, and assertion
//! utilities.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use rowsift_kernel::ListContext;
use rowsift_kernel::db::{ListBackend, ListSession};
use rowsift_kernel::listing::ListLimits;
use rowsift_kernel::schema::SchemaRegistry;

mod pg;

pub use pg::PgFixture;

/// The shop catalog shipped with the binary.
pub const SHOP_CATALOG: &str = include_str!("../../../config/shop-schema.toml");

/// Registry built from [`SHOP_CATALOG`].
pub fn shop_registry() -> Arc<SchemaRegistry> {
    match SchemaRegistry::from_toml_str(SHOP_CATALOG) {
        Ok(registry) => Arc::new(registry),
        Err(err) => panic!("shop catalog is invalid: {err:#}"),
    }
}

/// Context over the shop registry and `backend`, with default limits.
pub fn test_context(backend: Arc<RecordingBackend>) -> ListContext {
    ListContext::new(shop_registry(), backend, ListLimits::default())
}

/// Category rows: two roots, three children, one orphan.
pub fn category_rows() -> Vec<Value> {
    vec![
        json!({"id": 1, "title": "Vehicles", "parent_id": null}),
        json!({"id": 2, "title": "Cars", "parent_id": 1}),
        json!({"id": 3, "title": "Bikes", "parent_id": 1}),
        json!({"id": 4, "title": "Books", "parent_id": null}),
        json!({"id": 5, "title": "Novels", "parent_id": 4}),
        json!({"id": 6, "title": "Stray", "parent_id": 99}),
    ]
}

/// Product rows with `n` entries, ids starting at 1.
pub fn product_rows(n: usize) -> Vec<Value> {
    (1..=n)
        .map(|i| {
            json!({
                "id": i,
                "title": format!("Product {i}"),
                "price": (i as f64) * 10.0,
                "stock": i % 4,
                "is_active": i % 2 == 0,
                "user_id": (i % 3) + 1,
                "category_id": (i % 2) + 2,
                "password": "never shown",
            })
        })
        .collect()
}

pub fn user_rows() -> Vec<Value> {
    vec![
        json!({"id": 1, "full_name": "Ada Admin", "email": "ada@example.com", "role_id": 1}),
        json!({"id": 2, "full_name": "Bob Buyer", "email": "bob@example.com", "role_id": 2}),
        json!({"id": 3, "full_name": "Cy Seller", "email": "cy@example.com", "role_id": null}),
    ]
}

pub fn role_rows() -> Vec<Value> {
    vec![
        json!({"id": 1, "title": "admin"}),
        json!({"id": 2, "title": "customer"}),
    ]
}

/// [`ListBackend`] that serves fixture rows and records every statement.
///
/// Within a session the first fetch is the page, cut from `rows` using the
/// LIMIT/OFFSET of its SQL; later fetches are eager loads answered from
/// `related`. Counts return the number of rows, so the backend behaves like
/// a table whose every row matches the filters. [`PgFixture`] covers real
/// filtering.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    rows: Arc<Vec<Value>>,
    related: Arc<HashMap<String, Vec<Value>>>,
    fail: bool,
    statements: Arc<Mutex<Vec<String>>>,
    sessions: Arc<Mutex<Vec<SessionLog>>>,
}

/// What one session did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionLog {
    pub statements: usize,
    pub finished: bool,
}

impl RecordingBackend {
    pub fn new(rows: Vec<Value>) -> Self {
        Self {
            rows: Arc::new(rows),
            ..Default::default()
        }
    }

    /// Rows returned by any eager load over `table`.
    pub fn with_related(mut self, table: &str, rows: Vec<Value>) -> Self {
        Arc::make_mut(&mut self.related).insert(table.to_string(), rows);
        self
    }

    /// Every session fails to open, as if the pool were exhausted.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// SQL of every statement seen, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    /// The most recent statement other than a count.
    pub fn last_page_sql(&self) -> Option<String> {
        self.statements
            .lock()
            .iter()
            .rev()
            .find(|sql| !sql.contains("COUNT(*)"))
            .cloned()
    }

    /// One entry per session opened, in order.
    pub fn sessions(&self) -> Vec<SessionLog> {
        self.sessions.lock().clone()
    }
}

#[async_trait]
impl ListBackend for RecordingBackend {
    async fn session(&self) -> Result<Box<dyn ListSession>, sqlx::Error> {
        if self.fail {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let index = {
            let mut sessions = self.sessions.lock();
            sessions.push(SessionLog::default());
            sessions.len() - 1
        };
        Ok(Box::new(RecordingSession {
            backend: self.clone(),
            index,
            page_served: false,
        }))
    }
}

struct RecordingSession {
    backend: RecordingBackend,
    index: usize,
    page_served: bool,
}

impl RecordingSession {
    fn record(&self, sql: &str) {
        self.backend.statements.lock().push(sql.to_string());
        if let Some(log) = self.backend.sessions.lock().get_mut(self.index) {
            log.statements += 1;
        }
    }
}

#[async_trait]
impl ListSession for RecordingSession {
    async fn count(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        self.record(sql);
        Ok(self.backend.rows.len() as u64)
    }

    async fn fetch(&mut self, sql: &str) -> Result<Vec<Value>, sqlx::Error> {
        self.record(sql);

        if !self.page_served {
            self.page_served = true;
            let rows = &self.backend.rows;
            let offset = clause_number(sql, " OFFSET ").unwrap_or(0);
            let limit = clause_number(sql, " LIMIT ").unwrap_or(rows.len());
            return Ok(rows.iter().skip(offset).take(limit).cloned().collect());
        }

        Ok(self
            .backend
            .related
            .iter()
            .find(|(table, _)| sql.contains(&format!(r#"FROM "{table}""#)))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn finish(&mut self) -> Result<(), sqlx::Error> {
        if let Some(log) = self.backend.sessions.lock().get_mut(self.index) {
            log.finished = true;
        }
        Ok(())
    }
}

fn clause_number(sql: &str, keyword: &str) -> Option<usize> {
    let start = sql.rfind(keyword)? + keyword.len();
    sql[start..]
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .and_then(|digits| digits.parse().ok())
}

/// Assertion helpers for JSON and SQL output.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{}', got: {}",
            key,
            value
        );
    }

    /// Assert that a JSON value lacks a specific key.
    pub fn lacks_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_none(),
            "Expected JSON to lack key '{}', got: {}",
            key,
            value
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{}'\nActual: {}",
            needle,
            haystack
        );
    }

    /// Ids of a list of JSON objects, in order.
    pub fn ids(rows: &[Value]) -> Vec<i64> {
        rows.iter()
            .map(|row| row["id"].as_i64().unwrap_or_default())
            .collect()
    }
}
