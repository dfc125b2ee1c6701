//! ObservationScope for operation begin/complete logging
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE`, `{name}_REJECTED` or `{name}_FAILED` when resolved
//! - Logs `{name}_INCOMPLETE` if dropped unresolved

use std::cell::Cell;
use std::time::Instant;

use super::logger::{Logger, Severity};

/// A scope around one operation.
///
/// Fields given at creation are repeated on every line the scope logs, and
/// resolution lines also carry `elapsed_ms`.
///
/// ```ignore
/// let scope = ObservationScope::with_fields("LIST", &[("resource", "post")]);
/// // ... do work ...
/// scope.complete_with_fields(&[("records", "10")]);
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    completed: Cell<bool>,
    fields: Vec<(&'a str, String)>,
    started: Instant,
}

impl<'a> ObservationScope<'a> {
    pub fn new(name: &'a str) -> Self {
        Self::with_fields(name, &[])
    }

    pub fn with_fields(name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);

        Self {
            name,
            completed: Cell::new(false),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started: Instant::now(),
        }
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(self, extra: &[(&str, &str)]) {
        self.resolve(Severity::Info, "COMPLETE", extra);
    }

    /// The caller's request was refused (validation, not found)
    pub fn reject(self, reason: &str) {
        self.resolve(Severity::Warn, "REJECTED", &[("reason", reason)]);
    }

    pub fn fail(self, reason: &str) {
        self.resolve(Severity::Error, "FAILED", &[("reason", reason)]);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    fn resolve(&self, severity: Severity, outcome: &str, extra: &[(&str, &str)]) {
        self.completed.set(true);
        let elapsed = self.elapsed_ms().to_string();

        let mut fields: Vec<(&str, &str)> = self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.extend(extra.iter().copied());
        fields.push(("elapsed_ms", &elapsed));

        Logger::log(severity, &format!("{}_{}", self.name, outcome), &fields);
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            let mut fields: Vec<(&str, &str)> =
                self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
            fields.push(("reason", "scope dropped without completion"));
            Logger::warn(&format!("{}_INCOMPLETE", self.name), &fields);
        }
    }
}
