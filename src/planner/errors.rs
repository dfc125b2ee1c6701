//! Planner error types
//!
//! Raised while resolving a parsed request against the schema registry,
//! always before any plan reaches the store.

use thiserror::Error;

/// Result type for planning
pub type PlanResult<T> = Result<T, PlanError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Root entity type is not registered
    #[error("Unknown resource type: {0}")]
    UnknownEntity(String),

    /// Include path names a relation the entity does not have
    #[error("Unknown relation '{relation}' on '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    /// Selected or ordered field is neither stored, appended nor a relation
    #[error("Unknown field '{field}' on '{entity}'")]
    UnknownField { entity: String, field: String },

    /// Filter references a field that cannot be filtered on
    #[error("Field '{field}' of '{entity}' cannot be used in filters")]
    DisallowedFilterField { entity: String, field: String },
}

impl PlanError {
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::UnknownEntity(_) => "UNKNOWN_RESOURCE",
            PlanError::UnknownRelation { .. } => "UNKNOWN_RELATION",
            PlanError::UnknownField { .. } => "UNKNOWN_FIELD",
            PlanError::DisallowedFilterField { .. } => "DISALLOWED_FILTER_FIELD",
        }
    }
}
