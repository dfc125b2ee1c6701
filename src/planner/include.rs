//! # Include Planner
//!
//! Resolves a parsed [`Selection`] against the schema registry into an
//! [`IncludeTree`]: an arena of nodes addressed by dotted relation path,
//! with the root entity at path `""`.
//!
//! Each node ends up with the stored fields to select (keys included,
//! appends excluded), the appends to compute after fetch, the fields to hide
//! again because they were only selected for joining, and the per-relation
//! window and ordering.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::errors::{PlanError, PlanResult};
use crate::query::{IncludeRequest, Selection};
use crate::schema::{RelationDescriptor, RelationKind, ResourceSchema, SchemaRegistry, SortDirection};

/// Index of a node in the [`IncludeTree`] arena
pub type NodeId = usize;

/// One resolved entity in the include tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludeNode {
    /// Dotted path from the root; empty for the root
    pub path: String,
    pub entity: String,
    pub table: String,
    pub primary_key: String,
    /// Relation reaching this node from its parent; `None` for the root
    pub relation: Option<RelationDescriptor>,
    pub parent: Option<NodeId>,
    /// Caller listed the fields instead of relying on defaults
    pub explicit: bool,
    /// Stored fields to fetch, unqualified
    pub fields: Vec<String>,
    /// Computed attributes to emit
    pub appends: Vec<String>,
    /// `fields`, qualified with `table`
    pub select: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order: Option<SortDirection>,
    /// Foreign key added to reattach this node's rows to their parent
    pub retained_foreign_key: Option<String>,
    /// Fields fetched only for joining, suppressed from output
    pub hidden: Vec<String>,
    /// Needs the ranked-window sub-plan
    pub ranked: bool,
    /// Child nodes keyed by relation name
    pub children: BTreeMap<String, NodeId>,
}

impl IncludeNode {
    fn new(path: String, schema: &ResourceSchema, relation: Option<RelationDescriptor>, parent: Option<NodeId>) -> Self {
        Self {
            path,
            entity: schema.entity.clone(),
            table: schema.table.clone(),
            primary_key: schema.primary_key.clone(),
            relation,
            parent,
            explicit: false,
            fields: Vec::new(),
            appends: Vec::new(),
            select: Vec::new(),
            limit: None,
            offset: None,
            order: None,
            retained_foreign_key: None,
            hidden: Vec::new(),
            ranked: false,
            children: BTreeMap::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.relation.is_none()
    }

    pub fn kind(&self) -> Option<&RelationKind> {
        self.relation.as_ref().map(|r| &r.kind)
    }

    pub fn is_to_many(&self) -> bool {
        self.kind().map_or(false, RelationKind::is_to_many)
    }

    /// Adds `field` unless present; returns whether it was added
    fn ensure_field(&mut self, field: &str) -> bool {
        if self.fields.iter().any(|f| f == field) {
            return false;
        }
        self.fields.push(field.to_string());
        true
    }

    /// Adds a join key the caller did not ask for and hides it
    fn ensure_join_key(&mut self, field: &str) -> bool {
        let added = self.ensure_field(field);
        if added && !self.hidden.iter().any(|h| h == field) {
            self.hidden.push(field.to_string());
        }
        added
    }
}

/// Arena of [`IncludeNode`]s. Node 0 is the root; nodes are stored in
/// depth-first order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncludeTree {
    nodes: Vec<IncludeNode>,
    #[serde(skip)]
    paths: HashMap<String, NodeId>,
}

impl IncludeTree {
    pub const ROOT: NodeId = 0;

    pub fn root(&self) -> &IncludeNode {
        &self.nodes[Self::ROOT]
    }

    pub fn node(&self, id: NodeId) -> &IncludeNode {
        &self.nodes[id]
    }

    pub fn get(&self, path: &str) -> Option<&IncludeNode> {
        self.paths.get(path).map(|&id| &self.nodes[id])
    }

    pub fn id_of(&self, path: &str) -> Option<NodeId> {
        self.paths.get(path).copied()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &IncludeNode)> {
        self.nodes[id]
            .children
            .values()
            .map(move |&child| (child, &self.nodes[child]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &IncludeNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, node: IncludeNode) -> NodeId {
        let id = self.nodes.len();
        self.paths.insert(node.path.clone(), id);
        if let Some(parent) = node.parent {
            if let Some(segment) = node.relation.as_ref().map(|r| r.name.clone()) {
                self.nodes[parent].children.insert(segment, id);
            }
        }
        self.nodes.push(node);
        id
    }
}

/// Builds include trees for one registry
#[derive(Debug, Clone, Copy)]
pub struct IncludePlanner<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> IncludePlanner<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Resolves `selection` for the `entity` resource.
    pub fn plan(&self, entity: &str, selection: &Selection) -> PlanResult<IncludeTree> {
        let schema = self.schema(entity)?;

        let mut tree = IncludeTree::default();
        let root = tree.push(IncludeNode::new(String::new(), schema, None, None));
        let requested = (!selection.fields.is_empty()).then_some(selection.fields.as_slice());
        self.resolve(&mut tree, root, schema, requested, selection)?;

        for node in &mut tree.nodes {
            node.select = node
                .fields
                .iter()
                .map(|f| format!("{}.{}", node.table, f))
                .collect();
        }
        Ok(tree)
    }

    fn schema(&self, entity: &str) -> PlanResult<&'a ResourceSchema> {
        self.registry
            .get(entity)
            .map(|s| s.as_ref())
            .ok_or_else(|| PlanError::UnknownEntity(entity.to_string()))
    }

    fn resolve(
        &self,
        tree: &mut IncludeTree,
        id: NodeId,
        schema: &'a ResourceSchema,
        requested: Option<&[String]>,
        selection: &Selection,
    ) -> PlanResult<()> {
        let names = requested.unwrap_or_else(|| schema.default_selection());

        let mut promoted = Vec::new();
        {
            let node = &mut tree.nodes[id];
            node.explicit = requested.is_some();
            node.ensure_field(&schema.primary_key);

            for name in names {
                if schema.is_append(name) {
                    if !node.appends.contains(name) {
                        node.appends.push(name.clone());
                    }
                } else if schema.has_field(name) {
                    node.ensure_field(name);
                } else if schema.relation(name).is_some() {
                    promoted.push(name.clone());
                } else {
                    return Err(PlanError::UnknownField {
                        entity: schema.entity.clone(),
                        field: name.clone(),
                    });
                }
            }

            match node.relation.as_ref().map(|r| r.kind.clone()) {
                Some(RelationKind::ToOneOwned { foreign_key, .. })
                | Some(RelationKind::ToManyDirect { foreign_key, .. }) => {
                    if node.ensure_join_key(&foreign_key) {
                        node.retained_foreign_key = Some(foreign_key);
                    }
                }
                Some(RelationKind::ToOneOwning { owner_key, .. }) => {
                    node.ensure_join_key(&owner_key);
                }
                Some(RelationKind::ToManyThroughJoin { related_key, .. }) => {
                    node.ensure_join_key(&related_key);
                }
                None => {}
            }
        }

        let path = tree.nodes[id].path.clone();
        for (name, request) in self.child_requests(&path, promoted, selection) {
            let relation = schema
                .relation(&name)
                .ok_or_else(|| PlanError::UnknownRelation {
                    entity: schema.entity.clone(),
                    relation: name.clone(),
                })?
                .clone();
            let target = self.schema(&relation.target)?;

            tree.nodes[id].ensure_join_key(relation.kind.parent_key());

            let mut child = IncludeNode::new(request.path.clone(), target, Some(relation.clone()), Some(id));
            if relation.kind.is_to_many() {
                child.limit = request.limit;
                child.offset = request.offset;
                child.order = Some(request.order.unwrap_or(relation.default_order));
                child.ranked = matches!(relation.kind, RelationKind::ToManyThroughJoin { .. });
            }
            let child_id = tree.push(child);

            let fields = request.explicit.then_some(request.fields.as_slice());
            self.resolve(tree, child_id, target, fields, selection)?;
        }

        Ok(())
    }

    /// Direct children of `path`: addressed includes first, then bare
    /// relation names promoted from the field list
    fn child_requests(
        &self,
        path: &str,
        promoted: Vec<String>,
        selection: &Selection,
    ) -> Vec<(String, IncludeRequest)> {
        let mut children: Vec<(String, IncludeRequest)> = selection
            .includes
            .iter()
            .filter_map(|(child_path, request)| {
                let (parent, name) = split_path(child_path);
                (parent == path).then(|| (name.to_string(), request.clone()))
            })
            .collect();

        for name in promoted {
            if children.iter().any(|(existing, _)| *existing == name) {
                continue;
            }
            let path = join_path(path, &name);
            children.push((
                name,
                IncludeRequest {
                    path,
                    ..Default::default()
                },
            ));
        }
        children
    }
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('.') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::blog_registry;

    fn plan(entity: &str, fields: &str) -> PlanResult<IncludeTree> {
        let registry = blog_registry();
        let selection = Selection::parse(fields).unwrap();
        IncludePlanner::new(&registry).plan(entity, &selection)
    }

    #[test]
    fn test_root_defaults_exclude_appends() {
        let tree = plan("post", "").unwrap();
        let root = tree.root();

        assert!(!root.explicit);
        assert_eq!(root.fields, vec!["id", "title"]);
        assert_eq!(root.appends, vec!["excerpt"]);
        assert_eq!(root.select, vec!["posts.id", "posts.title"]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_primary_key_always_selected() {
        let tree = plan("post", "title").unwrap();
        assert!(tree.root().select.contains(&"posts.id".to_string()));
        assert!(tree.root().hidden.is_empty());
    }

    #[test]
    fn test_default_include_retains_foreign_key() {
        let tree = plan("post", "id,comments").unwrap();
        let comments = tree.get("comments").unwrap();

        assert!(!comments.explicit);
        assert_eq!(comments.fields, vec!["id", "body", "post_id"]);
        assert_eq!(comments.retained_foreign_key.as_deref(), Some("post_id"));
        assert_eq!(comments.hidden, vec!["post_id"]);
        assert_eq!(comments.order, Some(SortDirection::Desc));
    }

    #[test]
    fn test_explicit_include_with_modifiers() {
        let tree = plan("post", "id,comments.limit(5).order(chronological){id,body}").unwrap();
        let comments = tree.get("comments").unwrap();

        assert!(comments.explicit);
        assert_eq!(comments.select, vec!["comments.id", "comments.body", "comments.post_id"]);
        assert_eq!(comments.limit, Some(5));
        assert_eq!(comments.order, Some(SortDirection::Asc));
    }

    #[test]
    fn test_requested_foreign_key_is_not_hidden() {
        let tree = plan("post", "id,comments{body,post_id}").unwrap();
        let comments = tree.get("comments").unwrap();
        assert!(comments.retained_foreign_key.is_none());
        assert!(comments.hidden.is_empty());
    }

    #[test]
    fn test_owning_relation_adds_parent_foreign_key() {
        let tree = plan("post", "title,author{name}").unwrap();
        let root = tree.root();
        assert_eq!(root.fields, vec!["id", "title", "user_id"]);
        assert_eq!(root.hidden, vec!["user_id"]);

        let author = tree.get("author").unwrap();
        assert_eq!(author.fields, vec!["id", "name"]);
        assert!(author.hidden.is_empty());
        assert!(author.order.is_none());
    }

    #[test]
    fn test_bare_relation_name_is_promoted() {
        let tree = plan("post", "id,author").unwrap();
        let author = tree.get("author").unwrap();
        assert_eq!(author.fields, vec!["id", "name"]);
        assert_eq!(author.appends, Vec::<String>::new());
        assert!(tree.root().children.contains_key("author"));
    }

    #[test]
    fn test_through_join_is_ranked() {
        let tree = plan("post", "id,tags.limit(2).offset(1)").unwrap();
        let tags = tree.get("tags").unwrap();
        assert!(tags.ranked);
        assert_eq!(tags.limit, Some(2));
        assert_eq!(tags.offset, Some(1));
        assert_eq!(tags.order, Some(SortDirection::Asc));
    }

    #[test]
    fn test_nested_path_nodes_are_depth_first() {
        let tree = plan("user", "id,posts.comments.author,profile").unwrap();
        let paths: Vec<&str> = tree.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["", "posts", "posts.comments", "posts.comments.author", "profile"]
        );

        let author = tree.get("posts.comments.author").unwrap();
        assert_eq!(author.entity, "user");
        let comments = tree.get("posts.comments").unwrap();
        assert_eq!(comments.hidden, vec!["post_id", "user_id"]);
    }

    #[test]
    fn test_unknown_relation() {
        let err = plan("post", "id,comments.ghost").unwrap_err();
        assert_eq!(
            err,
            PlanError::UnknownRelation {
                entity: "comment".into(),
                relation: "ghost".into()
            }
        );
    }

    #[test]
    fn test_unknown_field() {
        assert!(matches!(
            plan("post", "id,nope"),
            Err(PlanError::UnknownField { field, .. }) if field == "nope"
        ));
        assert!(matches!(
            plan("post", "comments{nope}"),
            Err(PlanError::UnknownField { entity, .. }) if entity == "comment"
        ));
    }

    #[test]
    fn test_unknown_entity() {
        assert_eq!(
            plan("invoice", "").unwrap_err(),
            PlanError::UnknownEntity("invoice".into())
        );
    }
}
