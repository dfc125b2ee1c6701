//! # Resource Lifecycle Controller
//!
//! Orchestrates list, fetch-one, create, update, delete and fetch-relation
//! around the parser, planner, store and response assembly.
//!
//! ## Flow
//!
//! ```text
//! ResourceRequest → validator → QueryRequest → IncludeTree → QueryPlan
//!                 → modify hooks → ResourceStore → AppendProcessor
//!                 → PaginationBuilder → Envelope
//! ```
//!
//! Mutations run inside a [`TransactionGuard`]; any error before commit
//! rolls the transaction back.

mod context;
#[allow(clippy::module_inception)]
mod controller;
mod errors;
mod events;
mod hooks;
mod operation;
mod transaction;

pub use context::{OperationContext, ResourceRequest};
pub use controller::{ResourceController, ResourceTarget};
pub use errors::{ApiError, ApiResult};
pub use events::{EventBus, EventPhase, EventRejected, LifecycleEvent, NullEventBus, RecordingEventBus};
pub use hooks::{QueryModifier, RequestValidator, RequiredFields};
pub use operation::OperationKind;
pub use transaction::TransactionGuard;
