//! Registry of resource schemas keyed by entity type

use std::collections::BTreeMap;
use std::sync::Arc;

use super::errors::{SchemaError, SchemaResult};
use super::types::{RelationKind, ResourceSchema};

/// Read-only lookup of resource schemas.
///
/// Built once at startup through [`SchemaRegistryBuilder`]; every relation is
/// checked against its target before the registry becomes available.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<ResourceSchema>>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    pub fn get(&self, entity: &str) -> Option<&Arc<ResourceSchema>> {
        self.schemas.get(entity)
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.schemas.contains_key(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Collects schemas and cross-checks them on [`build`](Self::build)
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    schemas: BTreeMap<String, ResourceSchema>,
}

impl SchemaRegistryBuilder {
    pub fn register(mut self, schema: ResourceSchema) -> SchemaResult<Self> {
        self.add(schema)?;
        Ok(self)
    }

    pub fn add(&mut self, schema: ResourceSchema) -> SchemaResult<()> {
        schema
            .validate_structure()
            .map_err(|reason| SchemaError::malformed(&schema.entity, reason))?;

        if self.schemas.contains_key(&schema.entity) {
            return Err(SchemaError::Duplicate(schema.entity));
        }
        self.schemas.insert(schema.entity.clone(), schema);
        Ok(())
    }

    pub fn build(self) -> SchemaResult<SchemaRegistry> {
        for schema in self.schemas.values() {
            for relation in schema.relations.values() {
                let target = self.schemas.get(&relation.target).ok_or_else(|| {
                    SchemaError::UnknownTarget {
                        entity: schema.entity.clone(),
                        relation: relation.name.clone(),
                        target: relation.target.clone(),
                    }
                })?;
                check_relation_keys(schema, target, &relation.name, &relation.kind)?;
            }
        }

        Ok(SchemaRegistry {
            schemas: self
                .schemas
                .into_iter()
                .map(|(entity, schema)| (entity, Arc::new(schema)))
                .collect(),
        })
    }
}

fn check_relation_keys(
    parent: &ResourceSchema,
    target: &ResourceSchema,
    relation: &str,
    kind: &RelationKind,
) -> SchemaResult<()> {
    let missing = |key: &str| SchemaError::MissingKey {
        entity: parent.entity.clone(),
        relation: relation.to_string(),
        key: key.to_string(),
    };

    let parent_key = kind.parent_key();
    if !parent.has_field(parent_key) {
        return Err(missing(parent_key));
    }
    let child_key = kind.child_key();
    if !target.has_field(child_key) {
        return Err(missing(child_key));
    }
    Ok(())
}
