//! # Query Plan Builder
//!
//! Compiles a resolved [`IncludeTree`] plus the request's filter, order and
//! paging into a [`QueryPlan`]. Filter and order fields are checked against
//! the root schema here, before anything is compiled.

use super::errors::{PlanError, PlanResult};
use super::include::{IncludeNode, IncludePlanner, IncludeTree, NodeId};
use super::plan::{Column, JoinEdge, OrderClause, Predicate, QueryPlan, RankedSubPlan, Window};
use crate::config::ResourceConfig;
use crate::query::{FilterExpr, OrderBy, QueryRequest};
use crate::schema::{RelationKind, ResourceSchema, SchemaRegistry};

/// Include tree and the plan compiled from it
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub tree: IncludeTree,
    pub plan: QueryPlan,
}

/// Turns parsed requests into plans for one registry and configuration
#[derive(Debug, Clone, Copy)]
pub struct QueryPlanBuilder<'a> {
    registry: &'a SchemaRegistry,
    config: &'a ResourceConfig,
}

impl<'a> QueryPlanBuilder<'a> {
    pub fn new(registry: &'a SchemaRegistry, config: &'a ResourceConfig) -> Self {
        Self { registry, config }
    }

    /// Plans includes and compiles the query in one step
    pub fn compile(&self, entity: &str, request: &QueryRequest) -> PlanResult<CompiledQuery> {
        let tree = IncludePlanner::new(self.registry).plan(entity, &request.selection)?;
        let plan = self.build(&tree, request)?;
        Ok(CompiledQuery { tree, plan })
    }

    /// Compiles an already resolved include tree
    pub fn build(&self, tree: &IncludeTree, request: &QueryRequest) -> PlanResult<QueryPlan> {
        let root = tree.root();
        let schema = self.schema(&root.entity)?;

        if let Some(filter) = &request.filter {
            check_filter_fields(schema, filter)?;
        }
        let order = compile_order(schema, &request.order)?;

        let predicate = request.filter.as_ref().map(|expr| Predicate {
            sql: expr.to_sql(&schema.table),
            expr: expr.clone(),
        });

        let joins = tree
            .children(IncludeTree::ROOT)
            .map(|(id, _)| self.compile_edge(tree, id))
            .collect::<PlanResult<Vec<_>>>()?;

        Ok(QueryPlan {
            entity: schema.entity.clone(),
            table: schema.table.clone(),
            primary_key: schema.primary_key.clone(),
            select: columns(root),
            joins,
            predicate,
            order,
            limit: Some(self.config.clamp_limit(request.limit, schema.max_limit)),
            offset: request.offset,
        })
    }

    fn schema(&self, entity: &str) -> PlanResult<&'a ResourceSchema> {
        self.registry
            .get(entity)
            .map(|s| s.as_ref())
            .ok_or_else(|| PlanError::UnknownEntity(entity.to_string()))
    }

    fn compile_edge(&self, tree: &IncludeTree, id: NodeId) -> PlanResult<JoinEdge> {
        let node = tree.node(id);
        let parent = match node.parent {
            Some(parent) => tree.node(parent),
            None => return Err(PlanError::UnknownRelation {
                entity: node.entity.clone(),
                relation: node.path.clone(),
            }),
        };
        let relation = match &node.relation {
            Some(relation) => relation,
            None => return Err(PlanError::UnknownRelation {
                entity: parent.entity.clone(),
                relation: node.path.clone(),
            }),
        };
        let target = self.schema(&node.entity)?;

        let direction = node.order.unwrap_or(relation.default_order);
        let pk_order = vec![OrderClause::new(
            Column::new(&node.table, &node.primary_key),
            direction,
        )];
        let window = self.window(node, target);

        let mut edge = JoinEdge {
            path: node.path.clone(),
            relation: relation.name.clone(),
            kind: relation.kind.clone(),
            entity: node.entity.clone(),
            table: node.table.clone(),
            primary_key: node.primary_key.clone(),
            parent_key: Column::new(&parent.table, relation.kind.parent_key()),
            child_key: Column::new(&node.table, relation.kind.child_key()),
            select: columns(node),
            order: Vec::new(),
            window: None,
            ranked: None,
            joins: Vec::new(),
        };

        match &relation.kind {
            RelationKind::ToOneOwned { .. } | RelationKind::ToOneOwning { .. } => {}
            RelationKind::ToManyDirect { .. } => {
                edge.order = pk_order;
                edge.window = window;
            }
            RelationKind::ToManyThroughJoin {
                pivot_table,
                foreign_pivot_key,
                related_pivot_key,
                related_key,
                ..
            } => {
                let grouping = Column::new(pivot_table, foreign_pivot_key);
                edge.child_key = grouping.clone();

                let mut inner_order = vec![OrderClause::new(grouping.clone(), direction)];
                inner_order.extend(pk_order.iter().cloned());

                edge.ranked = Some(RankedSubPlan {
                    pivot_table: pivot_table.clone(),
                    foreign_pivot_key: grouping,
                    related_pivot_key: Column::new(pivot_table, related_pivot_key),
                    related_key: Column::new(&node.table, related_key),
                    inner_select: edge.select.clone(),
                    inner_order,
                    window,
                    enforced: self.config.enforce_rank_window,
                });
                edge.order = pk_order;
            }
        }

        edge.joins = tree
            .children(id)
            .map(|(child, _)| self.compile_edge(tree, child))
            .collect::<PlanResult<Vec<_>>>()?;
        Ok(edge)
    }

    /// Per-parent window of a to-many node; absent when neither modifier was given
    fn window(&self, node: &IncludeNode, target: &ResourceSchema) -> Option<Window> {
        if node.limit.is_none() && node.offset.is_none() {
            return None;
        }
        let limit = node.limit.map(|l| {
            self.config
                .clamp_limit(Some(i64::try_from(l).unwrap_or(i64::MAX)), target.max_limit)
        });
        Some(Window {
            offset: node.offset.unwrap_or(0),
            limit,
        })
    }
}

fn columns(node: &IncludeNode) -> Vec<Column> {
    node.fields
        .iter()
        .map(|f| Column::new(&node.table, f))
        .collect()
}

/// Only stored fields may be filtered on; appends and relations are rejected
fn check_filter_fields(schema: &ResourceSchema, filter: &FilterExpr) -> PlanResult<()> {
    match filter.fields().into_iter().find(|f| !schema.has_field(f)) {
        Some(field) => Err(PlanError::DisallowedFilterField {
            entity: schema.entity.clone(),
            field: field.to_string(),
        }),
        None => Ok(()),
    }
}

fn compile_order(schema: &ResourceSchema, order: &[OrderBy]) -> PlanResult<Vec<OrderClause>> {
    order
        .iter()
        .map(|clause| {
            if !schema.has_field(&clause.field) {
                return Err(PlanError::UnknownField {
                    entity: schema.entity.clone(),
                    field: clause.field.clone(),
                });
            }
            Ok(OrderClause::new(
                Column::new(&schema.table, &clause.field),
                clause.direction,
            ))
        })
        .collect()
}
