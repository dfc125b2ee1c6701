//! Compiled query plans
//!
//! A [`QueryPlan`] is engine-agnostic: columns are table-qualified, the
//! predicate carries both its raw SQL rendering and the AST it came from,
//! and every include edge is a [`JoinEdge`] nested under the edge (or root)
//! it hangs off.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::FilterExpr;
use crate::schema::{RelationKind, SortDirection};

/// Alias of the running row counter in a ranked sub-plan
pub const RANK_ALIAS: &str = "rank";
/// Alias carrying the previous row's group value in a ranked sub-plan
pub const RANK_GROUP_ALIAS: &str = "rank_group";
/// Alias of the derived table wrapping the ranked rows
pub const OUTER_ALIAS: &str = "outer_query";

/// A table-qualified column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub table: String,
    pub name: String,
}

impl Column {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Splits `table.name`; `None` if unqualified
    pub fn parse(qualified: &str) -> Option<Self> {
        qualified
            .split_once('.')
            .map(|(table, name)| Self::new(table, name))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderClause {
    pub column: Column,
    pub direction: SortDirection,
}

impl OrderClause {
    pub fn new(column: Column, direction: SortDirection) -> Self {
        Self { column, direction }
    }
}

/// Compiled filter: the raw boolean handed to the engine plus its source AST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub sql: String,
    pub expr: FilterExpr,
}

/// Per-parent row window of a to-many edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub offset: u64,
    pub limit: Option<u64>,
}

impl Window {
    /// Inclusive rank bounds `[offset + 1, offset + limit]`
    pub fn rank_range(&self) -> (u64, Option<u64>) {
        (self.offset + 1, self.limit.map(|l| self.offset + l))
    }

    /// Whether a 1-based rank falls inside the window
    pub fn contains(&self, rank: u64) -> bool {
        let (low, high) = self.rank_range();
        rank >= low && high.map_or(true, |h| rank <= h)
    }
}

/// Ranked-window emulation for a to-many-through-join edge.
///
/// The inner query selects the target columns plus the pivot's parent key,
/// ordered by that key and then by `order`. A running counter named
/// [`RANK_ALIAS`] restarts at 1 whenever the key changes from the previous
/// row. The outer query joins the ranked rows back to the pivot table and,
/// when `enforced`, keeps only ranks inside `window`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedSubPlan {
    pub pivot_table: String,
    /// Pivot column pointing at the parent
    pub foreign_pivot_key: Column,
    /// Pivot column pointing at the target
    pub related_pivot_key: Column,
    /// Target column matched by `related_pivot_key`
    pub related_key: Column,
    pub inner_select: Vec<Column>,
    /// Grouping key first, then the secondary order
    pub inner_order: Vec<OrderClause>,
    pub window: Option<Window>,
    pub enforced: bool,
}

impl RankedSubPlan {
    /// Rank bounds applied to the outer query, if any
    pub fn rank_filter(&self) -> Option<(u64, Option<u64>)> {
        if !self.enforced {
            return None;
        }
        self.window.map(|w| w.rank_range())
    }
}

/// One eager-load edge of the include tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinEdge {
    /// Dotted include path
    pub path: String,
    /// Relation name, the key under which children are attached
    pub relation: String,
    pub kind: RelationKind,
    pub entity: String,
    pub table: String,
    pub primary_key: String,
    /// Parent column the children are matched against
    pub parent_key: Column,
    /// Child column (or pivot column for through-joins) holding the parent value
    pub child_key: Column,
    pub select: Vec<Column>,
    pub order: Vec<OrderClause>,
    /// Direct to-many window, applied per parent by the store
    pub window: Option<Window>,
    pub ranked: Option<RankedSubPlan>,
    pub joins: Vec<JoinEdge>,
}

/// Compiled, engine-agnostic query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub entity: String,
    pub table: String,
    pub primary_key: String,
    pub select: Vec<Column>,
    pub joins: Vec<JoinEdge>,
    pub predicate: Option<Predicate>,
    pub order: Vec<OrderClause>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl QueryPlan {
    /// Same plan with paging stripped, for total counts
    pub fn without_paging(&self) -> Self {
        Self {
            limit: None,
            offset: 0,
            ..self.clone()
        }
    }

    /// Qualified primary key column of the root entity
    pub fn primary_column(&self) -> Column {
        Column::new(&self.table, &self.primary_key)
    }

    /// Every edge, depth-first
    pub fn edges(&self) -> Vec<&JoinEdge> {
        fn walk<'a>(edges: &'a [JoinEdge], out: &mut Vec<&'a JoinEdge>) {
            for edge in edges {
                out.push(edge);
                walk(&edge.joins, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.joins, &mut out);
        out
    }
}
