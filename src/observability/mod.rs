//! Observability subsystem
//!
//! Structured JSON logging and operation scopes.
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No async or background threads
//! 4. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use resourceql::observability::{Logger, ObservationScope};
//!
//! Logger::info("SCHEMA_LOADED", &[("entities", "5")]);
//!
//! let scope = ObservationScope::with_fields("LIST", &[("resource", "post")]);
//! // ... do work ...
//! scope.complete();
//! ```

mod logger;
mod scope;

pub use logger::{Logger, Severity};
pub use scope::ObservationScope;
