//! # Request Parameters
//!
//! Turns the raw `fields`, `filters`, `order`, `limit` and `offset`
//! parameters into a [`QueryRequest`]. The raw strings are kept so that
//! pagination links can repeat them verbatim.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::errors::{QueryError, QueryResult};
use super::filter::{parse_filter, FilterExpr};
use super::order::{parse_order, OrderBy};
use super::selection::{parse_selection, Selection};
use crate::config::ResourceConfig;

/// Raw query parameters as received
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

impl RequestParams {
    /// Picks the recognised keys out of a query-string map; blank values
    /// count as absent
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            map.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            fields: get("fields"),
            filters: get("filters"),
            order: get("order"),
            limit: get("limit"),
            offset: get("offset"),
        }
    }

    pub fn with_fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    pub fn with_filters(mut self, filters: impl Into<String>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit.to_string());
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset.to_string());
        self
    }
}

/// Parsed representation of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Top-level fields and the include paths
    pub selection: Selection,
    pub filter: Option<FilterExpr>,
    pub order: Vec<OrderBy>,
    /// Requested page size, before clamping against the schema maximum
    pub limit: Option<i64>,
    pub offset: u64,
}

impl QueryRequest {
    /// Parses every parameter; the first malformed one fails the request
    pub fn parse(params: &RequestParams) -> QueryResult<Self> {
        let selection = match params.fields.as_deref() {
            Some(fields) => parse_selection(fields)?,
            None => Selection::default(),
        };
        let filter = params.filters.as_deref().map(parse_filter).transpose()?;
        let order = match params.order.as_deref() {
            Some(order) => parse_order(order)?,
            None => Vec::new(),
        };
        let limit = params
            .limit
            .as_deref()
            .map(|raw| parse_int("limit", raw))
            .transpose()?;
        let offset = params
            .offset
            .as_deref()
            .map(|raw| parse_int("offset", raw))
            .transpose()?
            .map(|n| n.max(0) as u64)
            .unwrap_or(0);

        Ok(Self {
            selection,
            filter,
            order,
            limit,
            offset,
        })
    }

    /// Page size after clamping into `[1, max]`
    pub fn effective_limit(&self, config: &ResourceConfig, schema_max: Option<u64>) -> u64 {
        config.clamp_limit(self.limit, schema_max)
    }
}

fn parse_int(name: &str, raw: &str) -> QueryResult<i64> {
    raw.trim().parse::<i64>().map_err(|_| QueryError::InvalidParam {
        name: name.to_string(),
        value: raw.to_string(),
    })
}
