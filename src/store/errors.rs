//! Store error types

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Row addressed by primary key does not exist
    #[error("No row in '{table}' with key {key}")]
    RowNotFound { table: String, key: String },

    /// Insert would duplicate a primary key
    #[error("Duplicate key {key} in '{table}'")]
    DuplicateKey { table: String, key: String },

    #[error("A transaction is already active")]
    TransactionActive,

    #[error("No active transaction")]
    NoTransaction,

    /// Rows must be JSON objects
    #[error("Invalid row for '{table}': {reason}")]
    InvalidRow { table: String, reason: String },

    /// Lock poisoned by a panicking writer
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// Engine-specific failure reported by a store implementation
    #[error("Store failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::RowNotFound { .. } => "STORE_ROW_NOT_FOUND",
            StoreError::DuplicateKey { .. } => "STORE_DUPLICATE_KEY",
            StoreError::TransactionActive => "STORE_TRANSACTION_ACTIVE",
            StoreError::NoTransaction => "STORE_NO_TRANSACTION",
            StoreError::InvalidRow { .. } => "STORE_INVALID_ROW",
            StoreError::LockPoisoned => "STORE_LOCK_POISONED",
            StoreError::Backend(_) => "STORE_BACKEND_ERROR",
        }
    }
}
