//! Schema registry errors

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while registering or loading resource schemas.
///
/// All of these occur at process start; none is recoverable per request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Descriptor is internally inconsistent
    #[error("Malformed schema '{source_name}': {reason}")]
    Malformed { source_name: String, reason: String },

    /// Entity type registered twice
    #[error("Schema for entity '{0}' is already registered")]
    Duplicate(String),

    /// Relation points at an entity type that was never registered
    #[error("Relation '{entity}.{relation}' targets unknown entity '{target}'")]
    UnknownTarget {
        entity: String,
        relation: String,
        target: String,
    },

    /// Relation key is not a field on the side that must carry it
    #[error("Relation '{entity}.{relation}' uses missing key '{key}'")]
    MissingKey {
        entity: String,
        relation: String,
        key: String,
    },
}

impl SchemaError {
    pub fn malformed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::Malformed { .. } => "SCHEMA_MALFORMED",
            SchemaError::Duplicate(_) => "SCHEMA_DUPLICATE",
            SchemaError::UnknownTarget { .. } => "SCHEMA_UNKNOWN_TARGET",
            SchemaError::MissingKey { .. } => "SCHEMA_MISSING_KEY",
        }
    }
}
