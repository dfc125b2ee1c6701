//! Request and operation context
//!
//! [`ResourceRequest`] is what the transport hands in. [`OperationContext`]
//! is created per operation and carries the request id, the start time and
//! the captured query log, so nothing diagnostic lives in process globals.

use std::time::Instant;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::operation::OperationKind;
use crate::query::RequestParams;
use crate::response::{round_seconds, Meta};

/// One incoming request as seen by the controller
#[derive(Debug, Clone, Default)]
pub struct ResourceRequest {
    /// URL the paging links are built on, without query string
    pub base_url: String,
    pub params: RequestParams,
    /// Body of create and update requests
    pub payload: Map<String, Value>,
    /// Capture executed queries into `meta` for this request only
    pub debug: bool,
}

impl ResourceRequest {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = params;
        self
    }

    /// Non-object payloads are treated as empty
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// State of one running operation
#[derive(Debug)]
pub struct OperationContext {
    pub request_id: Uuid,
    pub kind: OperationKind,
    pub entity: String,
    capture: bool,
    queries: Vec<String>,
    started_at: Instant,
}

impl OperationContext {
    pub fn new(kind: OperationKind, entity: impl Into<String>, capture: bool) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            kind,
            entity: entity.into(),
            capture,
            queries: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn captures_queries(&self) -> bool {
        self.capture
    }

    /// Records a rendered query when capture is on
    pub fn record_query(&mut self, sql: impl Into<String>) {
        if self.capture {
            self.queries.push(sql.into());
        }
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn elapsed_seconds(&self) -> f64 {
        round_seconds(self.started_at.elapsed().as_secs_f64())
    }

    /// `meta` with elapsed time and, if captured, the query log
    pub fn meta(&self) -> Meta {
        let meta = Meta::new(self.elapsed_seconds());
        if self.capture {
            meta.with_queries(self.queries.clone())
        } else {
            meta
        }
    }
}
