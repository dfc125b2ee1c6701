//! Query language errors

use thiserror::Error;

/// Result type for query parsing
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while parsing request parameters.
///
/// Parsing is all-or-nothing: any of these aborts the request before a plan
/// is built.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Malformed `fields` parameter
    #[error("Invalid field selection at {position}: {message}")]
    SelectionSyntax { position: usize, message: String },

    /// Malformed `filters` parameter
    #[error("Invalid filter at {position}: {message}")]
    FilterSyntax { position: usize, message: String },

    /// Malformed `order` parameter
    #[error("Invalid order at {position}: {message}")]
    OrderSyntax { position: usize, message: String },

    /// Non-numeric or negative `limit`/`offset`
    #[error("Invalid query parameter '{name}': {value}")]
    InvalidParam { name: String, value: String },
}

impl QueryError {
    pub(crate) fn selection(position: usize, message: impl Into<String>) -> Self {
        Self::SelectionSyntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn filter(position: usize, message: impl Into<String>) -> Self {
        Self::FilterSyntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn order(position: usize, message: impl Into<String>) -> Self {
        Self::OrderSyntax {
            position,
            message: message.into(),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::SelectionSyntax { .. } => "SELECTION_SYNTAX_ERROR",
            QueryError::FilterSyntax { .. } => "FILTER_SYNTAX_ERROR",
            QueryError::OrderSyntax { .. } => "ORDER_SYNTAX_ERROR",
            QueryError::InvalidParam { .. } => "INVALID_QUERY_PARAM",
        }
    }
}
