//! # Response Assembly
//!
//! Everything that happens after the store returns rows: append
//! computation, join-key hiding, paging metadata and the response envelope.

mod appends;
mod envelope;
mod pagination;

pub use appends::{AppendProcessor, AttributeComputer, ComputedAttributes};
pub use envelope::{round_seconds, Envelope, Meta, ResourceResponse};
pub use pagination::{PageLinks, Paging, PaginationBuilder};
