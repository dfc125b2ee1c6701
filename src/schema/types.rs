//! Resource schema descriptors
//!
//! A `ResourceSchema` describes one entity type: the table it lives in, its
//! primary key, the stored fields, the fields returned when the caller asks
//! for nothing specific, the computed ("append") attributes and the relations
//! to other entity types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Ordering direction shared by the order language, relation defaults and plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    /// SQL keyword for this direction
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// How a relation links the parent entity to its target.
///
/// Key names are unqualified column names; the planner qualifies them with
/// the owning table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    /// Target row carries `foreign_key` pointing at the parent's `local_key` (has-one)
    ToOneOwned {
        foreign_key: String,
        local_key: String,
    },
    /// Parent row carries `foreign_key` pointing at the target's `owner_key` (belongs-to)
    ToOneOwning {
        foreign_key: String,
        owner_key: String,
    },
    /// Target rows carry `foreign_key` pointing at the parent's `local_key` (has-many)
    ToManyDirect {
        foreign_key: String,
        local_key: String,
    },
    /// Rows in `pivot_table` link `parent_key` (via `foreign_pivot_key`) to
    /// the target's `related_key` (via `related_pivot_key`)
    ToManyThroughJoin {
        pivot_table: String,
        foreign_pivot_key: String,
        related_pivot_key: String,
        parent_key: String,
        related_key: String,
    },
}

impl RelationKind {
    pub fn is_to_many(&self) -> bool {
        matches!(
            self,
            RelationKind::ToManyDirect { .. } | RelationKind::ToManyThroughJoin { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::ToOneOwned { .. } => "to_one_owned",
            RelationKind::ToOneOwning { .. } => "to_one_owning",
            RelationKind::ToManyDirect { .. } => "to_many_direct",
            RelationKind::ToManyThroughJoin { .. } => "to_many_through_join",
        }
    }

    /// Column on the parent row used to attach children
    pub fn parent_key(&self) -> &str {
        match self {
            RelationKind::ToOneOwned { local_key, .. }
            | RelationKind::ToManyDirect { local_key, .. } => local_key,
            RelationKind::ToOneOwning { foreign_key, .. } => foreign_key,
            RelationKind::ToManyThroughJoin { parent_key, .. } => parent_key,
        }
    }

    /// Column on the target row matched against the parent key
    pub fn child_key(&self) -> &str {
        match self {
            RelationKind::ToOneOwned { foreign_key, .. }
            | RelationKind::ToManyDirect { foreign_key, .. } => foreign_key,
            RelationKind::ToOneOwning { owner_key, .. } => owner_key,
            RelationKind::ToManyThroughJoin { related_key, .. } => related_key,
        }
    }
}

/// A named relation from one entity type to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub name: String,
    /// Entity type name of the target, resolved through the registry
    pub target: String,
    #[serde(flatten)]
    pub kind: RelationKind,
    /// Used for to-many includes that carry no `.order(...)` modifier
    #[serde(default = "default_relation_order")]
    pub default_order: SortDirection,
}

fn default_relation_order() -> SortDirection {
    SortDirection::Desc
}

impl RelationDescriptor {
    pub fn new(name: impl Into<String>, target: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind,
            default_order: default_relation_order(),
        }
    }

    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            target,
            RelationKind::ToOneOwned {
                foreign_key: foreign_key.into(),
                local_key: "id".to_string(),
            },
        )
    }

    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            target,
            RelationKind::ToOneOwning {
                foreign_key: foreign_key.into(),
                owner_key: "id".to_string(),
            },
        )
    }

    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            target,
            RelationKind::ToManyDirect {
                foreign_key: foreign_key.into(),
                local_key: "id".to_string(),
            },
        )
    }

    pub fn belongs_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        pivot_table: impl Into<String>,
        foreign_pivot_key: impl Into<String>,
        related_pivot_key: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            target,
            RelationKind::ToManyThroughJoin {
                pivot_table: pivot_table.into(),
                foreign_pivot_key: foreign_pivot_key.into(),
                related_pivot_key: related_pivot_key.into(),
                parent_key: "id".to_string(),
                related_key: "id".to_string(),
            },
        )
    }

    pub fn with_default_order(mut self, direction: SortDirection) -> Self {
        self.default_order = direction;
        self
    }
}

/// Descriptor of one entity type. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    /// Entity type name, also the prefix of lifecycle event names
    pub entity: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Stored fields, in declaration order
    pub fields: Vec<String>,
    /// Fields returned when the caller selects nothing explicitly
    #[serde(default)]
    pub default_fields: Vec<String>,
    /// Computed attributes, never selected from storage
    #[serde(default)]
    pub appends: Vec<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDescriptor>,
    /// Overrides the configured maximum page size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_limit: Option<u64>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl ResourceSchema {
    /// Creates a schema whose default fields are all stored fields
    pub fn new(
        entity: impl Into<String>,
        table: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        Self {
            entity: entity.into(),
            table: table.into(),
            primary_key: default_primary_key(),
            default_fields: fields.clone(),
            fields,
            appends: Vec::new(),
            relations: BTreeMap::new(),
            max_limit: None,
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_default_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.default_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_appends(mut self, appends: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.appends = appends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    pub fn with_max_limit(mut self, max_limit: u64) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn is_append(&self, field: &str) -> bool {
        self.appends.iter().any(|f| f == field)
    }

    /// Fields used when the caller gives no explicit selection; falls back to
    /// every stored field when no defaults were declared
    pub fn default_selection(&self) -> &[String] {
        if self.default_fields.is_empty() {
            &self.fields
        } else {
            &self.default_fields
        }
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    /// Table-qualified column name
    pub fn qualify(&self, field: &str) -> String {
        format!("{}.{}", self.table, field)
    }

    /// Checks internal consistency, independent of other schemas
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.entity.is_empty() {
            return Err("entity name must not be empty".into());
        }
        if self.table.is_empty() {
            return Err(format!("entity '{}' has no table", self.entity));
        }
        if !self.has_field(&self.primary_key) {
            return Err(format!(
                "primary key '{}' is not a field of '{}'",
                self.primary_key, self.entity
            ));
        }
        if let Some(append) = self.appends.iter().find(|a| self.has_field(a)) {
            return Err(format!(
                "append '{}' of '{}' shadows a stored field",
                append, self.entity
            ));
        }
        if let Some(field) = self
            .default_fields
            .iter()
            .find(|f| !self.has_field(f) && !self.is_append(f))
        {
            return Err(format!(
                "default field '{}' of '{}' is neither stored nor appended",
                field, self.entity
            ));
        }
        for (name, relation) in &self.relations {
            if name != &relation.name {
                return Err(format!(
                    "relation registered as '{}' is named '{}'",
                    name, relation.name
                ));
            }
            if self.has_field(name) {
                return Err(format!(
                    "relation '{}' of '{}' shadows a stored field",
                    name, self.entity
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> ResourceSchema {
        ResourceSchema::new("post", "posts", ["id", "title", "body", "user_id"])
            .with_default_fields(["id", "title"])
            .with_appends(["excerpt"])
            .with_relation(RelationDescriptor::has_many("comments", "comment", "post_id"))
    }

    #[test]
    fn test_valid_structure() {
        assert!(post().validate_structure().is_ok());
    }

    #[test]
    fn test_primary_key_must_be_field() {
        let schema = post().with_primary_key("uuid");
        assert!(schema.validate_structure().unwrap_err().contains("uuid"));
    }

    #[test]
    fn test_append_cannot_shadow_field() {
        let schema = post().with_appends(["title"]);
        assert!(schema.validate_structure().is_err());
    }

    #[test]
    fn test_relation_keys() {
        let owning = RelationKind::ToOneOwning {
            foreign_key: "user_id".into(),
            owner_key: "id".into(),
        };
        assert_eq!(owning.parent_key(), "user_id");
        assert_eq!(owning.child_key(), "id");
        assert!(!owning.is_to_many());
    }

    #[test]
    fn test_relation_descriptor_json() {
        let json = serde_json::json!({
            "name": "tags",
            "target": "tag",
            "kind": "to_many_through_join",
            "pivot_table": "post_tag",
            "foreign_pivot_key": "post_id",
            "related_pivot_key": "tag_id",
            "parent_key": "id",
            "related_key": "id"
        });
        let relation: RelationDescriptor = serde_json::from_value(json).unwrap();
        assert!(relation.kind.is_to_many());
        assert_eq!(relation.default_order, SortDirection::Desc);
    }
}
