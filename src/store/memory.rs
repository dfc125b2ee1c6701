//! # In-Memory Store
//!
//! Reference [`ResourceStore`] that interprets [`QueryPlan`]s over JSON rows
//! held in memory. Through-join windows are evaluated the way the ranked
//! sub-plan describes: rows sorted by the pivot's parent key, a running
//! counter that restarts on every key change, then the rank filter.
//!
//! Transactions snapshot every table on `begin` and restore the snapshot on
//! `rollback`. Only one transaction may be open at a time.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};
use super::record::{Record, RelationValue};
use super::ResourceStore;
use crate::planner::{Column, JoinEdge, OrderClause, QueryPlan, RankedSubPlan};
use crate::query::order_values;
use crate::schema::{RelationKind, SortDirection};

type Row = Map<String, Value>;
type Tables = HashMap<String, Table>;

#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

/// Store backed by in-memory tables
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot: Mutex<Option<Tables>>,
    executed: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends rows to a table, creating it if needed. Pivot tables are
    /// seeded the same way.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) -> StoreResult<()> {
        let mut tables = self.write()?;
        let entry = tables.entry(table.to_string()).or_default();
        for row in rows {
            let row = into_row(table, row)?;
            if let Some(id) = row.get("id").and_then(Value::as_i64) {
                entry.next_id = entry.next_id.max(id);
            }
            entry.rows.push(row);
        }
        Ok(())
    }

    /// Copy of every row in `table`, in insertion order
    pub fn rows(&self, table: &str) -> StoreResult<Vec<Value>> {
        let tables = self.read()?;
        Ok(tables
            .get(table)
            .map(|t| t.rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default())
    }

    /// Number of plans executed through `fetch` or `count`
    pub fn executed(&self) -> usize {
        self.executed.load(AtomicOrdering::SeqCst)
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn matching<'t>(tables: &'t Tables, plan: &QueryPlan) -> Vec<&'t Row> {
        let rows = match tables.get(&plan.table) {
            Some(table) => &table.rows,
            None => return Vec::new(),
        };
        rows.iter()
            .filter(|row| plan.predicate.as_ref().map_or(true, |p| p.expr.matches(row)))
            .collect()
    }

    /// Loads every edge for a batch of parents, then recurses into the children
    fn attach(tables: &Tables, parents: &mut [Record], edges: &[JoinEdge]) {
        for edge in edges {
            let mut groups = match &edge.ranked {
                Some(ranked) => load_ranked(tables, edge, ranked, parents),
                None => load_direct(tables, edge, parents),
            };

            // Flatten so nested edges load once per level, not once per parent
            let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
            let mut flat: Vec<Record> = groups.drain(..).flatten().collect();
            Self::attach(tables, &mut flat, &edge.joins);

            let mut children = flat.into_iter();
            for (parent, size) in parents.iter_mut().zip(sizes) {
                let group: Vec<Record> = children.by_ref().take(size).collect();
                let value = if edge.kind.is_to_many() {
                    RelationValue::Many(group)
                } else {
                    RelationValue::One(group.into_iter().next().map(Box::new))
                };
                parent.relations.insert(edge.relation.clone(), value);
            }
        }
    }
}

impl ResourceStore for MemoryStore {
    fn fetch(&self, plan: &QueryPlan) -> StoreResult<Vec<Record>> {
        self.executed.fetch_add(1, AtomicOrdering::SeqCst);
        let tables = self.read()?;

        let mut rows = Self::matching(&tables, plan);
        sort_rows(&mut rows, &plan.order);

        let offset = usize::try_from(plan.offset).unwrap_or(usize::MAX);
        let limit = plan
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        let mut records: Vec<Record> = rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| Record::new(&plan.entity, project(row, &plan.select)))
            .collect();

        Self::attach(&tables, &mut records, &plan.joins);
        Ok(records)
    }

    fn count(&self, plan: &QueryPlan) -> StoreResult<u64> {
        self.executed.fetch_add(1, AtomicOrdering::SeqCst);
        let tables = self.read()?;
        Ok(Self::matching(&tables, plan).len() as u64)
    }

    fn insert(&self, table: &str, primary_key: &str, mut values: Row) -> StoreResult<Value> {
        let mut tables = self.write()?;
        let entry = tables.entry(table.to_string()).or_default();

        let key = match values.get(primary_key) {
            Some(key) if !key.is_null() => key.clone(),
            _ => {
                entry.next_id += 1;
                let key = Value::from(entry.next_id);
                values.insert(primary_key.to_string(), key.clone());
                key
            }
        };
        if entry.rows.iter().any(|row| same_key(row.get(primary_key), &key)) {
            return Err(StoreError::DuplicateKey {
                table: table.to_string(),
                key: key.to_string(),
            });
        }
        if let Some(id) = key.as_i64() {
            entry.next_id = entry.next_id.max(id);
        }

        entry.rows.push(values);
        Ok(key)
    }

    fn update(&self, table: &str, primary_key: &str, key: &Value, values: Row) -> StoreResult<()> {
        let mut tables = self.write()?;
        let row = tables
            .get_mut(table)
            .and_then(|t| t.rows.iter_mut().find(|row| same_key(row.get(primary_key), key)))
            .ok_or_else(|| StoreError::RowNotFound {
                table: table.to_string(),
                key: key.to_string(),
            })?;

        for (field, value) in values {
            row.insert(field, value);
        }
        Ok(())
    }

    fn delete(&self, table: &str, primary_key: &str, key: &Value) -> StoreResult<()> {
        let mut tables = self.write()?;
        let not_found = || StoreError::RowNotFound {
            table: table.to_string(),
            key: key.to_string(),
        };
        let rows = &mut tables.get_mut(table).ok_or_else(not_found)?.rows;
        let index = rows
            .iter()
            .position(|row| same_key(row.get(primary_key), key))
            .ok_or_else(not_found)?;
        rows.remove(index);
        Ok(())
    }

    fn begin(&self) -> StoreResult<()> {
        let mut snapshot = self.snapshot.lock().map_err(|_| StoreError::LockPoisoned)?;
        if snapshot.is_some() {
            return Err(StoreError::TransactionActive);
        }
        *snapshot = Some(self.read()?.clone());
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        let mut snapshot = self.snapshot.lock().map_err(|_| StoreError::LockPoisoned)?;
        snapshot.take().map(|_| ()).ok_or(StoreError::NoTransaction)
    }

    fn rollback(&self) -> StoreResult<()> {
        let mut snapshot = self.snapshot.lock().map_err(|_| StoreError::LockPoisoned)?;
        let saved = snapshot.take().ok_or(StoreError::NoTransaction)?;
        *self.write()? = saved;
        Ok(())
    }
}

fn into_row(table: &str, value: Value) -> StoreResult<Row> {
    match value {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::InvalidRow {
            table: table.to_string(),
            reason: format!("expected object, found {}", other),
        }),
    }
}

fn key_string(value: &Value) -> String {
    value.to_string()
}

fn same_key(actual: Option<&Value>, key: &Value) -> bool {
    actual.map_or(false, |v| order_values(v, key) == Some(Ordering::Equal))
}

fn project(row: &Row, select: &[Column]) -> Row {
    select
        .iter()
        .map(|column| {
            let value = row.get(&column.name).cloned().unwrap_or(Value::Null);
            (column.name.clone(), value)
        })
        .collect()
}

fn compare_rows(a: &Row, b: &Row, order: &[OrderClause]) -> Ordering {
    for clause in order {
        let left = a.get(&clause.column.name).unwrap_or(&Value::Null);
        let right = b.get(&clause.column.name).unwrap_or(&Value::Null);
        let ordering = order_values(left, right).unwrap_or(Ordering::Equal);
        let ordering = match clause.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn sort_rows(rows: &mut [&Row], order: &[OrderClause]) {
    if !order.is_empty() {
        rows.sort_by(|a, b| compare_rows(a, b, order));
    }
}

/// One group of child records per parent, for to-one and direct to-many edges
fn load_direct(tables: &Tables, edge: &JoinEdge, parents: &[Record]) -> Vec<Vec<Record>> {
    let rows: &[Row] = tables.get(&edge.table).map(|t| t.rows.as_slice()).unwrap_or(&[]);

    let mut by_key: HashMap<String, Vec<&Row>> = HashMap::new();
    for row in rows {
        if let Some(value) = row.get(&edge.child_key.name).filter(|v| !v.is_null()) {
            by_key.entry(key_string(value)).or_default().push(row);
        }
    }

    parents
        .iter()
        .map(|parent| {
            let mut matched = parent
                .get(&edge.parent_key.name)
                .and_then(|value| by_key.get(&key_string(value)))
                .cloned()
                .unwrap_or_default();
            sort_rows(&mut matched, &edge.order);

            let matched: Vec<&Row> = match (&edge.kind, edge.window) {
                (RelationKind::ToManyDirect { .. }, Some(window)) => {
                    let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
                    let limit = window
                        .limit
                        .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
                        .unwrap_or(usize::MAX);
                    matched.into_iter().skip(offset).take(limit).collect()
                }
                (kind, _) if !kind.is_to_many() => matched.into_iter().take(1).collect(),
                _ => matched,
            };

            matched
                .into_iter()
                .map(|row| Record::new(&edge.entity, project(row, &edge.select)))
                .collect()
        })
        .collect()
}

/// Through-join children, bounded per parent with the running-counter rank
fn load_ranked(
    tables: &Tables,
    edge: &JoinEdge,
    ranked: &RankedSubPlan,
    parents: &[Record],
) -> Vec<Vec<Record>> {
    let pivot: &[Row] = tables.get(&ranked.pivot_table).map(|t| t.rows.as_slice()).unwrap_or(&[]);
    let targets: &[Row] = tables.get(&edge.table).map(|t| t.rows.as_slice()).unwrap_or(&[]);

    let parent_keys: Vec<String> = parents
        .iter()
        .filter_map(|p| p.get(&edge.parent_key.name))
        .map(key_string)
        .collect();

    let group_field = &ranked.foreign_pivot_key.name;
    let related_field = &ranked.related_pivot_key.name;

    // Inner query: target rows joined to the pivot, with the group key
    let mut joined: Vec<(Value, Row)> = Vec::new();
    for link in pivot {
        let group = match link.get(group_field) {
            Some(group) if parent_keys.contains(&key_string(group)) => group,
            _ => continue,
        };
        let related = match link.get(related_field) {
            Some(related) => related,
            None => continue,
        };
        if let Some(target) = targets
            .iter()
            .find(|row| same_key(row.get(&ranked.related_key.name), related))
        {
            let mut row = target.clone();
            row.insert(group_field.clone(), group.clone());
            joined.push((group.clone(), row));
        }
    }
    joined.sort_by(|a, b| compare_rows(&a.1, &b.1, &ranked.inner_order));

    // Running counter: restarts at 1 whenever the group value changes
    let bounds = ranked.rank_filter();
    let mut previous: Option<String> = None;
    let mut rank = 0u64;
    let mut grouped: HashMap<String, Vec<Row>> = HashMap::new();
    for (group, row) in joined {
        let group = key_string(&group);
        rank = if previous.as_deref() == Some(group.as_str()) { rank + 1 } else { 1 };
        previous = Some(group.clone());

        let inside = bounds.map_or(true, |(low, high)| {
            rank >= low && high.map_or(true, |h| rank <= h)
        });
        if inside {
            grouped.entry(group).or_default().push(row);
        }
    }

    parents
        .iter()
        .map(|parent| {
            let mut rows: Vec<&Row> = parent
                .get(&edge.parent_key.name)
                .and_then(|value| grouped.get(&key_string(value)))
                .map(|rows| rows.iter().collect())
                .unwrap_or_default();
            sort_rows(&mut rows, &edge.order);
            rows.into_iter()
                .map(|row| Record::new(&edge.entity, project(row, &edge.select)))
                .collect()
        })
        .collect()
}
