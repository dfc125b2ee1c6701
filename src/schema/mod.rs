//! Resource schema registry
//!
//! Every entity type exposed through the resource layer is described once,
//! at process start, by a [`ResourceSchema`]. The registry is read-only after
//! it is built; the parser, planner and controller only ever borrow from it.

mod errors;
mod loader;
mod registry;
mod types;

pub use errors::{SchemaError, SchemaResult};
pub use loader::SchemaLoader;
pub use registry::{SchemaRegistry, SchemaRegistryBuilder};
pub use types::{RelationDescriptor, RelationKind, ResourceSchema, SortDirection};
