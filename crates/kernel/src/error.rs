//! Listing error types.

use thiserror::Error;

/// Errors raised while compiling or executing a listing.
///
/// Everything except [`ListError::Database`] is detected locally, before any
/// statement reaches the database.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("invalid field path '{path}': {reason}")]
    InvalidFieldPath { path: String, reason: String },

    #[error("column '{column}' cannot accept '{value}': {reason}")]
    InvalidValue {
        column: String,
        value: String,
        reason: String,
    },

    #[error("{param} is malformed: {reason}")]
    MalformedFilter { param: &'static str, reason: String },

    #[error("date '{0}' is not in a recognized format")]
    InvalidDateFormat(String),

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl ListError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ListError::InvalidFieldPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_value(
        column: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ListError::InvalidValue {
            column: column.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(param: &'static str, reason: impl Into<String>) -> Self {
        ListError::MalformedFilter {
            param,
            reason: reason.into(),
        }
    }

    /// Whether the failure was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ListError::Database(_))
    }
}

/// Result type alias using ListError.
pub type ListOpResult<T> = Result<T, ListError>;
