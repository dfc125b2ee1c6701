//! Explain output
//!
//! Renders compiled plans as SQL-like text. The same rendering is what the
//! controller records when query capture is on.

use std::fmt;

use super::errors::PlanError;
use super::plan::{
    Column, JoinEdge, OrderClause, QueryPlan, RankedSubPlan, OUTER_ALIAS, RANK_ALIAS,
    RANK_GROUP_ALIAS,
};

/// One rendered statement of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainStatement {
    /// Include path; empty for the root query
    pub path: String,
    pub kind: String,
    pub sql: String,
}

/// Explain plan output
#[derive(Debug, Clone)]
pub struct ExplainPlan {
    /// Whether planning succeeded
    pub accepted: bool,
    pub entity: Option<String>,
    /// Root query first, then one statement per include edge, depth-first
    pub statements: Vec<ExplainStatement>,
    /// Total-count query
    pub count: Option<String>,
    pub rejection_reason: Option<String>,
    pub rejection_code: Option<String>,
}

impl ExplainPlan {
    /// Creates an explain plan from a compiled query plan
    pub fn from_plan(plan: &QueryPlan) -> Self {
        let mut statements = vec![ExplainStatement {
            path: String::new(),
            kind: "root".to_string(),
            sql: render_select(plan),
        }];
        statements.extend(plan.edges().into_iter().map(|edge| ExplainStatement {
            path: edge.path.clone(),
            kind: edge.kind.as_str().to_string(),
            sql: render_edge(edge),
        }));

        Self {
            accepted: true,
            entity: Some(plan.entity.clone()),
            statements,
            count: Some(render_count(plan)),
            rejection_reason: None,
            rejection_code: None,
        }
    }

    /// Creates an explain plan from a planning error
    pub fn from_error(err: &PlanError) -> Self {
        Self {
            accepted: false,
            entity: None,
            statements: Vec::new(),
            count: None,
            rejection_reason: Some(err.to_string()),
            rejection_code: Some(err.code().to_string()),
        }
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;

        if self.accepted {
            writeln!(f, "Status: ACCEPTED")?;
            if let Some(entity) = &self.entity {
                writeln!(f, "Resource: {}", entity)?;
            }
            for statement in &self.statements {
                if statement.path.is_empty() {
                    writeln!(f, "Query: {}", statement.sql)?;
                } else {
                    writeln!(f, "Include {} [{}]:", statement.path, statement.kind)?;
                    writeln!(f, "  {}", statement.sql)?;
                }
            }
            if let Some(count) = &self.count {
                writeln!(f, "Count: {}", count)?;
            }
        } else {
            writeln!(f, "Status: REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "Error Code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "Reason: {}", reason)?;
            }
        }

        Ok(())
    }
}

/// `SELECT ... FROM ... [WHERE] [ORDER BY] [LIMIT] [OFFSET]` for the root query
pub fn render_select(plan: &QueryPlan) -> String {
    let mut sql = format!("SELECT {} FROM {}", join_columns(&plan.select), plan.table);
    if let Some(predicate) = &plan.predicate {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate.sql);
    }
    push_order(&mut sql, &plan.order);
    if let Some(limit) = plan.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if plan.offset > 0 {
        sql.push_str(&format!(" OFFSET {}", plan.offset));
    }
    sql
}

/// Total-count query: same filter, no paging
pub fn render_count(plan: &QueryPlan) -> String {
    let mut sql = format!("SELECT COUNT({}) FROM {}", plan.primary_column(), plan.table);
    if let Some(predicate) = &plan.predicate {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate.sql);
    }
    sql
}

/// Eager-load statement for one edge; parent key values bind to `:<column>`
pub fn render_edge(edge: &JoinEdge) -> String {
    if let Some(ranked) = &edge.ranked {
        return render_ranked(edge, ranked);
    }

    let mut sql = format!(
        "SELECT {} FROM {} WHERE {} IN (:{})",
        join_columns(&edge.select),
        edge.table,
        edge.child_key,
        edge.parent_key
    );
    push_order(&mut sql, &edge.order);
    if let Some(window) = edge.window {
        sql.push_str(&format!(" PER PARENT OFFSET {}", window.offset));
        if let Some(limit) = window.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
    }
    sql
}

fn render_ranked(edge: &JoinEdge, ranked: &RankedSubPlan) -> String {
    let group = &ranked.foreign_pivot_key;
    let inner = format!(
        "SELECT {select}, @{rank} := IF(@{group_alias} = {group}, @{rank} + 1, 1) AS {rank}, \
         @{group_alias} := {group} AS {group_alias} \
         FROM {table} RIGHT JOIN {pivot} ON {related_pivot} = {related} \
         WHERE {group} IN (:{parent}){order}",
        select = join_columns(&ranked.inner_select),
        rank = RANK_ALIAS,
        group_alias = RANK_GROUP_ALIAS,
        group = group,
        table = edge.table,
        pivot = ranked.pivot_table,
        related_pivot = ranked.related_pivot_key,
        related = ranked.related_key,
        parent = edge.parent_key,
        order = order_suffix(&ranked.inner_order),
    );

    let mut sql = format!(
        "SELECT {select}, {group} FROM {table} \
         INNER JOIN {pivot} ON {related_pivot} = {related} \
         INNER JOIN (SELECT * FROM ({inner}) AS {table}) AS {outer} \
         ON {outer}.{related_name} = {related_pivot} AND {outer}.{group_alias} = {group}",
        select = join_columns(&edge.select),
        group = group,
        table = edge.table,
        pivot = ranked.pivot_table,
        related_pivot = ranked.related_pivot_key,
        related = ranked.related_key,
        inner = inner,
        outer = OUTER_ALIAS,
        related_name = ranked.related_key.name,
        group_alias = RANK_GROUP_ALIAS,
    );
    if let Some((low, high)) = ranked.rank_filter() {
        match high {
            Some(high) => sql.push_str(&format!(
                " WHERE {}.{} BETWEEN {} AND {}",
                OUTER_ALIAS, RANK_ALIAS, low, high
            )),
            None => sql.push_str(&format!(" WHERE {}.{} >= {}", OUTER_ALIAS, RANK_ALIAS, low)),
        }
    }
    push_order(&mut sql, &edge.order);
    sql
}

fn join_columns(columns: &[Column]) -> String {
    columns
        .iter()
        .map(Column::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn order_suffix(order: &[OrderClause]) -> String {
    let mut out = String::new();
    push_order(&mut out, order);
    out
}

fn push_order(sql: &mut String, order: &[OrderClause]) {
    if order.is_empty() {
        return;
    }
    let clauses: Vec<String> = order
        .iter()
        .map(|o| format!("{} {}", o.column, o.direction.keyword()))
        .collect();
    sql.push_str(" ORDER BY ");
    sql.push_str(&clauses.join(", "));
}
