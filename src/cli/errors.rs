//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::planner::PlanError;
use crate::query::QueryError;
use crate::schema::SchemaError;

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Schema(#[from] SchemaError),

    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("{0}")]
    Plan(#[from] PlanError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "CLI_CONFIG_ERROR",
            CliError::Schema(err) => err.code(),
            CliError::Query(err) => err.code(),
            CliError::Plan(err) => err.code(),
            CliError::Io(_) => "CLI_IO_ERROR",
            CliError::Json(_) => "CLI_JSON_ERROR",
        }
    }
}
