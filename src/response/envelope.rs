//! # Response Envelope
//!
//! Every operation answers with `{ message, data, meta }`. `meta.paging` is
//! only present for list responses; `queries` and `queries_list` only when
//! query capture is on for the request.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::pagination::Paging;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
    /// Seconds from operation start, three decimals
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries_list: Option<Vec<String>>,
}

impl Meta {
    pub fn new(time: f64) -> Self {
        Self {
            paging: None,
            time: round_seconds(time),
            queries: None,
            queries_list: None,
        }
    }

    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = Some(paging);
        self
    }

    pub fn with_queries(mut self, queries: Vec<String>) -> Self {
        self.queries = Some(queries.len());
        self.queries_list = Some(queries);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub message: Option<String>,
    pub data: Value,
    pub meta: Meta,
}

impl Envelope {
    pub fn new(data: Value, meta: Meta) -> Self {
        Self {
            message: None,
            data,
            meta,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Envelope plus the status it is sent with
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceResponse {
    pub status: StatusCode,
    pub envelope: Envelope,
}

impl ResourceResponse {
    pub fn ok(envelope: Envelope) -> Self {
        Self {
            status: StatusCode::OK,
            envelope,
        }
    }

    pub fn created(envelope: Envelope) -> Self {
        Self {
            status: StatusCode::CREATED,
            envelope,
        }
    }

    pub fn data(&self) -> &Value {
        &self.envelope.data
    }

    pub fn meta(&self) -> &Meta {
        &self.envelope.meta
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.envelope).unwrap_or(Value::Null)
    }
}

impl IntoResponse for ResourceResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

/// Rounds to millisecond precision
pub fn round_seconds(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}
