//! Type coercion of raw filter values.
//!
//! Raw values come from query strings (usually text) or from callers that
//! already hold typed JSON values. Each is converted to what its column's
//! semantic type expects, or rejected with `InvalidValue`.

use serde_json::Value;

use super::dates::parse_date;
use super::types::FilterValue;
use crate::error::{ListError, ListOpResult};
use crate::schema::ColumnType;

/// Coerce `raw` for the column named `column` of type `column_type`.
pub fn coerce(column: &str, column_type: ColumnType, raw: &Value) -> ListOpResult<FilterValue> {
    let reject = |reason: &str| ListError::invalid_value(column, display_raw(raw), reason);

    if matches!(raw, Value::Null | Value::Array(_) | Value::Object(_)) {
        return Err(reject("expected a scalar value"));
    }

    match column_type {
        ColumnType::Integer | ColumnType::Float | ColumnType::Decimal => match raw {
            Value::Number(n) => native_number(n).ok_or_else(|| reject("number out of range")),
            Value::String(s) => {
                let trimmed = s.trim();
                if column_type == ColumnType::Integer {
                    trimmed
                        .parse::<i64>()
                        .map(FilterValue::Integer)
                        .map_err(|_| reject("expected an integer"))
                } else {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(FilterValue::Float)
                        .ok_or_else(|| reject("expected a number"))
                }
            }
            _ => Err(reject("expected a number")),
        },
        ColumnType::Boolean => match raw {
            Value::Bool(b) => Ok(FilterValue::Boolean(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(FilterValue::Boolean(true)),
                "false" | "0" | "no" => Ok(FilterValue::Boolean(false)),
                _ => Err(reject("expected true/false, 1/0 or yes/no")),
            },
            _ => Err(reject("expected a boolean")),
        },
        ColumnType::Timestamp => match raw {
            Value::String(s) => parse_date(s).map(FilterValue::Timestamp),
            _ => Err(reject("expected a date string")),
        },
        ColumnType::String | ColumnType::Text | ColumnType::Json => match raw {
            Value::String(s) => Ok(FilterValue::Text(s.clone())),
            other => Ok(FilterValue::Text(other.to_string())),
        },
    }
}

/// Native JSON numbers pass through with their own representation.
fn native_number(n: &serde_json::Number) -> Option<FilterValue> {
    if let Some(i) = n.as_i64() {
        Some(FilterValue::Integer(i))
    } else {
        n.as_f64().map(FilterValue::Float)
    }
}

fn display_raw(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
