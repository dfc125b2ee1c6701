//! Query planning subsystem
//!
//! Planning runs in two passes:
//!
//! 1. [`IncludePlanner`] resolves the parsed selection against the schema
//!    registry into an [`IncludeTree`].
//! 2. [`QueryPlanBuilder`] compiles the tree plus filter, order and paging
//!    into a [`QueryPlan`].
//!
//! Plans are deterministic: the same request and registry always produce
//! the same plan, and [`ExplainPlan`] renders it the same way every time.
//!
//! Bounded to-many-through-join includes compile to a [`RankedSubPlan`]
//! because the store cannot apply a per-parent row limit to a many-to-many
//! collection loaded in one round trip.

mod builder;
mod errors;
mod explain;
mod include;
mod plan;

pub use builder::{CompiledQuery, QueryPlanBuilder};
pub use errors::{PlanError, PlanResult};
pub use explain::{render_count, render_edge, render_select, ExplainPlan, ExplainStatement};
pub use include::{IncludeNode, IncludePlanner, IncludeTree, NodeId};
pub use plan::{
    Column, JoinEdge, OrderClause, Predicate, QueryPlan, RankedSubPlan, Window, OUTER_ALIAS,
    RANK_ALIAS, RANK_GROUP_ALIAS,
};
