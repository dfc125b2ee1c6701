//! Result tree records
//!
//! A [`Record`] is one fetched entity: its stored field values, nested
//! relation values mirroring the include tree, the computed attributes to
//! emit, and the fields to suppress from output.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

/// Value of an included relation on one record
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl RelationValue {
    /// Contained records, in order
    pub fn records(&self) -> Vec<&Record> {
        match self {
            RelationValue::One(Some(record)) => vec![record.as_ref()],
            RelationValue::One(None) => Vec::new(),
            RelationValue::Many(records) => records.iter().collect(),
        }
    }

    pub fn records_mut(&mut self) -> Vec<&mut Record> {
        match self {
            RelationValue::One(Some(record)) => vec![record.as_mut()],
            RelationValue::One(None) => Vec::new(),
            RelationValue::Many(records) => records.iter_mut().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RelationValue::One(record) => usize::from(record.is_some()),
            RelationValue::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Value {
        match self {
            RelationValue::One(Some(record)) => record.to_json(),
            RelationValue::One(None) => Value::Null,
            RelationValue::Many(records) => Value::Array(records.iter().map(Record::to_json).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub entity: String,
    /// Stored values, as selected
    pub fields: Map<String, Value>,
    /// Included relations keyed by relation name
    pub relations: BTreeMap<String, RelationValue>,
    /// Computed attributes, filled in after fetch
    pub appends: Map<String, Value>,
    /// Fields fetched for joining only
    pub hidden: BTreeSet<String>,
}

impl Record {
    pub fn new(entity: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            entity: entity.into(),
            fields,
            relations: BTreeMap::new(),
            appends: Map::new(),
            hidden: BTreeSet::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationValue> {
        self.relations.get(name)
    }

    /// Output shape: visible fields, then computed attributes, then relations
    pub fn to_json(&self) -> Value {
        let mut out: Map<String, Value> = self
            .fields
            .iter()
            .filter(|(name, _)| !self.hidden.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for (name, value) in &self.appends {
            out.insert(name.clone(), value.clone());
        }
        for (name, relation) in &self.relations {
            out.insert(name.clone(), relation.to_json());
        }
        Value::Object(out)
    }
}
