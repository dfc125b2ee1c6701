//! Store boundary
//!
//! The resource layer never talks to a database directly. It hands compiled
//! [`QueryPlan`]s and primary-key addressed writes to a [`ResourceStore`],
//! which returns [`Record`] trees shaped like the plan's join edges.
//!
//! [`MemoryStore`] interprets plans over in-memory rows and backs the tests.

mod errors;
mod memory;
mod record;

pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use record::{Record, RelationValue};

use serde_json::{Map, Value};

use crate::planner::QueryPlan;

/// Relational engine seen by the resource layer.
///
/// Calls are synchronous and may block. Implementations own their locking;
/// transactions are scoped by `begin`, `commit` and `rollback`.
pub trait ResourceStore: Send + Sync {
    /// Executes a plan, nesting related records per join edge
    fn fetch(&self, plan: &QueryPlan) -> StoreResult<Vec<Record>>;

    /// Number of root rows the plan matches, ignoring its limit and offset
    fn count(&self, plan: &QueryPlan) -> StoreResult<u64>;

    /// Inserts a row and returns its primary key value
    fn insert(&self, table: &str, primary_key: &str, values: Map<String, Value>) -> StoreResult<Value>;

    fn update(
        &self,
        table: &str,
        primary_key: &str,
        key: &Value,
        values: Map<String, Value>,
    ) -> StoreResult<()>;

    fn delete(&self, table: &str, primary_key: &str, key: &Value) -> StoreResult<()>;

    fn begin(&self) -> StoreResult<()>;

    fn commit(&self) -> StoreResult<()>;

    fn rollback(&self) -> StoreResult<()>;
}
