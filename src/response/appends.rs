//! # Append Processor
//!
//! Post-fetch pass over a result tree: computes the requested append
//! attributes on every record and marks join-only fields hidden, walking
//! relation values alongside the include tree.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::planner::{IncludeTree, NodeId};
use crate::store::Record;

/// Computes append attributes from a record's stored fields
pub trait AttributeComputer: Send + Sync {
    /// `None` when the entity has no computation for `attribute`
    fn compute(&self, entity: &str, attribute: &str, fields: &Map<String, Value>) -> Option<Value>;
}

type Computation = Box<dyn Fn(&Map<String, Value>) -> Value + Send + Sync>;

/// Closure registry keyed by `(entity, attribute)`
#[derive(Default)]
pub struct ComputedAttributes {
    computations: HashMap<(String, String), Computation>,
}

impl ComputedAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, entity: &str, attribute: &str, compute: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.register(entity, attribute, compute);
        self
    }

    pub fn register<F>(&mut self, entity: &str, attribute: &str, compute: F)
    where
        F: Fn(&Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.computations
            .insert((entity.to_string(), attribute.to_string()), Box::new(compute));
    }
}

impl fmt::Debug for ComputedAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .computations
            .keys()
            .map(|(entity, attribute)| format!("{}.{}", entity, attribute))
            .collect();
        keys.sort();
        f.debug_struct("ComputedAttributes").field("computations", &keys).finish()
    }
}

impl AttributeComputer for ComputedAttributes {
    fn compute(&self, entity: &str, attribute: &str, fields: &Map<String, Value>) -> Option<Value> {
        self.computations
            .get(&(entity.to_string(), attribute.to_string()))
            .map(|compute| compute(fields))
    }
}

/// Walks fetched records and fills in appends and hidden fields
pub struct AppendProcessor<'a> {
    computer: &'a dyn AttributeComputer,
}

impl<'a> AppendProcessor<'a> {
    pub fn new(computer: &'a dyn AttributeComputer) -> Self {
        Self { computer }
    }

    /// Processes root records against the tree's root node
    pub fn process(&self, tree: &IncludeTree, records: &mut [Record]) {
        for record in records {
            self.process_record(tree, IncludeTree::ROOT, record);
        }
    }

    fn process_record(&self, tree: &IncludeTree, id: NodeId, record: &mut Record) {
        let node = tree.node(id);

        // Appends without a computation render as null
        for attribute in &node.appends {
            let value = self
                .computer
                .compute(&node.entity, attribute, &record.fields)
                .unwrap_or(Value::Null);
            record.appends.insert(attribute.clone(), value);
        }
        record.hidden.extend(node.hidden.iter().cloned());

        for (name, &child) in &node.children {
            if let Some(value) = record.relations.get_mut(name) {
                for nested in value.records_mut() {
                    self.process_record(tree, child, nested);
                }
            }
        }
    }
}
