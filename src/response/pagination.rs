//! # Pagination
//!
//! Builds `meta.paging` for list responses. `next` exists iff
//! `offset + limit < total`; `previous` exists iff `offset >= limit`. Links
//! repeat the caller's `fields`, `filters`, `order` and `limit` parameters
//! and only rewrite `offset`.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::query::RequestParams;

/// Unreserved characters stay literal, everything else is escaped
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    /// Matching rows with filters applied and paging stripped
    pub total: u64,
    pub links: PageLinks,
}

/// Computes paging metadata for one list request
#[derive(Debug, Clone, Copy)]
pub struct PaginationBuilder<'a> {
    base_url: &'a str,
    params: &'a RequestParams,
    limit: u64,
    offset: u64,
}

impl<'a> PaginationBuilder<'a> {
    /// `limit` is the effective, clamped page size
    pub fn new(base_url: &'a str, params: &'a RequestParams, limit: u64, offset: u64) -> Self {
        Self {
            base_url,
            params,
            limit,
            offset,
        }
    }

    pub fn has_next(&self, total: u64) -> bool {
        self.offset.saturating_add(self.limit) < total
    }

    pub fn has_previous(&self) -> bool {
        self.offset >= self.limit
    }

    pub fn build(&self, total: u64) -> Paging {
        let next = self
            .has_next(total)
            .then(|| self.link(self.offset.saturating_add(self.limit)));
        let previous = self
            .has_previous()
            .then(|| self.link(self.offset - self.limit));

        Paging {
            total,
            links: PageLinks { next, previous },
        }
    }

    fn link(&self, offset: u64) -> String {
        let preserved = [
            ("fields", &self.params.fields),
            ("filters", &self.params.filters),
            ("order", &self.params.order),
            ("limit", &self.params.limit),
        ];

        let mut pairs: Vec<String> = preserved
            .iter()
            .filter_map(|(name, value)| {
                value
                    .as_deref()
                    .map(|v| format!("{}={}", name, utf8_percent_encode(v, QUERY_ENCODE_SET)))
            })
            .collect();
        pairs.push(format!("offset={}", offset));

        format!("{}?{}", self.base_url, pairs.join("&"))
    }
}
