//! Controller extension points
//!
//! Validators run before any data access and can refuse a request.
//! Query modifiers adjust a compiled plan before it is executed; with none
//! registered plans run unchanged.

use serde_json::{Map, Value};

use super::context::ResourceRequest;
use super::operation::OperationKind;
use crate::planner::QueryPlan;

/// Checks request shape and content for one operation kind
pub trait RequestValidator: Send + Sync {
    /// Returns the failure messages, if any
    fn validate(&self, entity: &str, request: &ResourceRequest) -> Result<(), Vec<String>>;
}

/// Operation-specific customization of compiled plans
pub trait QueryModifier: Send + Sync {
    fn modify(&self, kind: OperationKind, plan: &mut QueryPlan);
}

/// Validator requiring payload keys to be present and non-null
#[derive(Debug, Clone, Default)]
pub struct RequiredFields {
    fields: Vec<String>,
}

impl RequiredFields {
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl RequestValidator for RequiredFields {
    fn validate(&self, _entity: &str, request: &ResourceRequest) -> Result<(), Vec<String>> {
        let missing: Vec<String> = self
            .fields
            .iter()
            .filter(|field| is_blank(&request.payload, field))
            .map(|field| format!("The {} field is required.", field))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }
}

fn is_blank(payload: &Map<String, Value>, field: &str) -> bool {
    match payload.get(field) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

impl<F> RequestValidator for F
where
    F: Fn(&str, &ResourceRequest) -> Result<(), Vec<String>> + Send + Sync,
{
    fn validate(&self, entity: &str, request: &ResourceRequest) -> Result<(), Vec<String>> {
        self(entity, request)
    }
}
