//! # Controller Errors
//!
//! [`ApiError`] is what every lifecycle operation returns on failure. It
//! wraps the subsystem errors and maps each kind to an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use thiserror::Error;

use crate::planner::PlanError;
use crate::query::QueryError;
use crate::response::{Envelope, Meta, ResourceResponse};
use crate::schema::SchemaError;
use crate::store::StoreError;

/// Result type for controller operations
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// Target entity absent for fetch-one, update, delete or fetch-relation
    #[error("Resource not found: {entity} {key}")]
    NotFound { entity: String, key: Value },

    /// A validator refused the request
    #[error("Validation failed: {}", .messages.join(" "))]
    ValidationFailed { messages: Vec<String> },

    /// A lifecycle event listener refused the event
    #[error("Event {event} rejected: {reason}")]
    Event { event: String, reason: String },

    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("{0}")]
    Plan(#[from] PlanError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Schema(#[from] SchemaError),
}

impl ApiError {
    pub fn not_found(entity: impl Into<String>, key: Value) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key,
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "RESOURCE_NOT_FOUND",
            ApiError::ValidationFailed { .. } => "VALIDATION_FAILED",
            ApiError::Event { .. } => "EVENT_REJECTED",
            ApiError::Query(err) => err.code(),
            ApiError::Plan(err) => err.code(),
            ApiError::Store(err) => err.code(),
            ApiError::Schema(err) => err.code(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // 404 Not Found
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Plan(PlanError::UnknownEntity(_)) => StatusCode::NOT_FOUND,

            // 422 Unprocessable Entity
            ApiError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 400 Bad Request
            ApiError::Query(_) => StatusCode::BAD_REQUEST,
            ApiError::Plan(_) => StatusCode::BAD_REQUEST,

            // 409 Conflict
            ApiError::Event { .. } => StatusCode::CONFLICT,
            ApiError::Store(StoreError::DuplicateKey { .. }) => StatusCode::CONFLICT,

            // 500 Internal Server Error
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Schema(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Refusals the caller can fix, as opposed to failures
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Error envelope: the error text as message, `data` null, and the
    /// seconds spent before the operation failed
    pub fn envelope(&self, time: f64) -> Envelope {
        Envelope::new(Value::Null, Meta::new(time)).with_message(self.to_string())
    }

    /// Status and envelope for an operation that failed after `time` seconds
    pub fn into_resource_response(self, time: f64) -> ResourceResponse {
        ResourceResponse {
            status: self.status_code(),
            envelope: self.envelope(time),
        }
    }
}

/// Errors raised outside a controller operation carry no elapsed time
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_resource_response(0.0).into_response()
    }
}
