//! Listing types.
//!
//! Provides the values that flow through a listing:
//! - FilterValue: a raw value after coercion to its column's type
//! - ListFilters: the filter bag (search term, wire-encoded filters, custom filters)
//! - Pagination / ListLimits: page, skip and limit handling
//! - ListResult / ListOutcome: the page of rows plus the total match count
//! - OutputShape: how rows are projected for the caller

use chrono::{DateTime, Utc};
use sea_query::Value;
use serde::{Deserialize, Serialize};

/// A filter value coerced to the type its column expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl From<FilterValue> for Value {
    fn from(value: FilterValue) -> Self {
        match value {
            FilterValue::Text(s) => s.into(),
            FilterValue::Integer(i) => i.into(),
            FilterValue::Float(f) => f.into(),
            FilterValue::Boolean(b) => b.into(),
            FilterValue::Timestamp(t) => t.into(),
        }
    }
}

/// A (field path, raw value) pair supplied programmatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: serde_json::Value,
}

impl FieldFilter {
    pub fn new(field: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

/// Filter bag for one listing.
///
/// `column_filters`, `number_range` and `date_range` hold the wire literals
/// exactly as received; they are decoded only when the compiler reaches them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFilters {
    pub search_term: Option<String>,

    /// e.g. `[["name","car"],["owner.role.title","admin"]]`
    pub column_filters: Option<String>,

    /// e.g. `["amount","0","100000"]`
    pub number_range: Option<String>,

    /// e.g. `["created_at","01-01-2025","01-12-2025"]`
    pub date_range: Option<String>,

    #[serde(default)]
    pub custom_filters: Vec<FieldFilter>,
}

impl ListFilters {
    pub fn search(mut self, term: &str) -> Self {
        self.search_term = Some(term.to_string());
        self
    }

    pub fn column_filters(mut self, wire: &str) -> Self {
        self.column_filters = Some(wire.to_string());
        self
    }

    pub fn number_range(mut self, wire: &str) -> Self {
        self.number_range = Some(wire.to_string());
        self
    }

    pub fn date_range(mut self, wire: &str) -> Self {
        self.date_range = Some(wire.to_string());
        self
    }

    pub fn custom(mut self, filter: FieldFilter) -> Self {
        self.custom_filters.push(filter);
        self
    }
}

/// Bounds applied to `limit` when it arrives as a raw parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLimits {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for ListLimits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// Page, skip and limit for one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based; overrides `skip` when present.
    pub page: Option<u64>,
    pub skip: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn new(page: Option<u64>, skip: u64, limit: u64) -> Self {
        Self { page, skip, limit }
    }

    pub fn page(page: u64, limit: u64) -> Self {
        Self::new(Some(page), 0, limit)
    }

    /// Rows skipped before the page starts.
    pub fn offset(&self) -> u64 {
        match self.page {
            Some(page) => page.saturating_sub(1).saturating_mul(self.limit),
            None => self.skip,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, 0, ListLimits::default().default_limit)
    }
}

/// A page of rows plus the number of rows matching the filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    pub rows: Vec<serde_json::Value>,
    pub total: u64,
}

/// Field names used to rebuild a parent/child forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeShape {
    pub id_field: String,
    pub parent_field: String,
    pub children_field: String,
}

impl Default for TreeShape {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            parent_field: "parent_id".to_string(),
            children_field: "children".to_string(),
        }
    }
}

/// How rows are shaped before they reach the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    #[default]
    Rows,
    /// Keep only these top-level keys.
    Fields(Vec<String>),
    /// Drop these top-level keys.
    Omit(Vec<String>),
    /// Rebuild a forest and return its roots.
    Tree(TreeShape),
}

/// Outcome of [`list_records`](super::list_records).
#[derive(Debug, Clone, PartialEq)]
pub enum ListOutcome {
    Found(ListResult),
    NotFound,
}

/// Response envelope for a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    pub success: u8,
    pub detail: String,
    pub data: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl ListOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, ListOutcome::Found(_))
    }

    /// Wrap the outcome in the `{success, detail, data, total}` envelope.
    pub fn into_response(self, entity: &str) -> ListResponse {
        match self {
            ListOutcome::Found(result) => ListResponse {
                success: 1,
                detail: format!("{entity} records found"),
                data: result.rows,
                total: Some(result.total),
            },
            ListOutcome::NotFound => ListResponse {
                success: 0,
                detail: format!("no {entity} records found"),
                data: Vec::new(),
                total: Some(0),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_overrides_skip() {
        let paged = Pagination::new(Some(2), 7, 10);
        assert_eq!(paged.offset(), 10);

        let skipped = Pagination::new(None, 10, 10);
        assert_eq!(skipped.offset(), paged.offset());
    }

    #[test]
    fn first_page_starts_at_zero() {
        assert_eq!(Pagination::page(1, 25).offset(), 0);
    }

    #[test]
    fn filter_bag_builder() {
        let filters = ListFilters::default()
            .search("car")
            .number_range(r#"["price", 1, 5]"#)
            .custom(FieldFilter::new("id", 7));
        assert_eq!(filters.search_term.as_deref(), Some("car"));
        assert!(filters.column_filters.is_none());
        assert_eq!(filters.custom_filters.len(), 1);
        assert_eq!(filters.custom_filters[0].value, serde_json::json!(7));
    }

    #[test]
    fn found_outcome_envelope() {
        let outcome = ListOutcome::Found(ListResult {
            rows: vec![serde_json::json!({"id": 1})],
            total: 12,
        });
        assert!(outcome.is_found());
        let response = outcome.into_response("product");
        assert_eq!(response.success, 1);
        assert_eq!(response.total, Some(12));
        assert_eq!(response.data.len(), 1);
    }

    #[test]
    fn not_found_outcome_envelope() {
        let response = ListOutcome::NotFound.into_response("product");
        assert_eq!(response.success, 0);
        assert!(response.data.is_empty());
        assert!(response.detail.contains("no product"));
    }

    #[test]
    fn output_shape_serialization() {
        let shape = OutputShape::Omit(vec!["password".to_string()]);
        let json = serde_json::to_string(&shape).unwrap();
        assert_eq!(json, r#"{"omit":["password"]}"#);
        let parsed: OutputShape = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, shape);
    }
}
