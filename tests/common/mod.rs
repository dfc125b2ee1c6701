//! Shared fixtures for integration tests
//!
//! The blog schema: users own posts, posts have comments and tags (through
//! the `post_tag` pivot), comments belong to users.

#![allow(dead_code)]

use std::sync::Arc;

use resourceql::config::ResourceConfig;
use resourceql::controller::{RecordingEventBus, ResourceController};
use resourceql::planner::QueryPlan;
use resourceql::response::ComputedAttributes;
use resourceql::schema::{SchemaLoader, SchemaRegistry};
use resourceql::store::{MemoryStore, Record, ResourceStore, StoreError, StoreResult};
use serde_json::{json, Map, Value};

pub const BLOG_SCHEMA: &str = include_str!("../fixtures/blog_schema.json");

pub fn registry() -> SchemaRegistry {
    let mut builder = SchemaRegistry::builder();
    for schema in SchemaLoader::parse("blog_schema.json", BLOG_SCHEMA).unwrap() {
        builder.add(schema).unwrap();
    }
    builder.build().unwrap()
}

/// 2 users, 25 posts alternating authors, 7 comments on posts 1 and 2,
/// 4 tags linked to posts 1 and 2
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .seed(
            "users",
            vec![
                json!({"id": 1, "name": "Ada", "email": "ada@example.com"}),
                json!({"id": 2, "name": "Lin", "email": "lin@example.com"}),
            ],
        )
        .unwrap();
    store
        .seed(
            "profiles",
            vec![json!({"id": 1, "bio": "Analyst", "user_id": 1})],
        )
        .unwrap();
    store
        .seed(
            "posts",
            (1..=25).map(|id| {
                json!({
                    "id": id,
                    "title": format!("Post {}", id),
                    "body": format!("Body of post {}", id),
                    "user_id": if id % 2 == 1 { 1 } else { 2 },
                    "created_at": format!("2024-01-{:02}", id),
                })
            }),
        )
        .unwrap();
    store
        .seed(
            "comments",
            (1..=7).map(|id| {
                json!({
                    "id": id,
                    "body": format!("Comment {}", id),
                    "post_id": if id <= 5 { 1 } else { 2 },
                    "user_id": 2,
                })
            }),
        )
        .unwrap();
    store
        .seed(
            "tags",
            vec![
                json!({"id": 1, "name": "rust"}),
                json!({"id": 2, "name": "sql"}),
                json!({"id": 3, "name": "http"}),
                json!({"id": 4, "name": "json"}),
            ],
        )
        .unwrap();
    store
        .seed(
            "post_tag",
            vec![
                json!({"post_id": 1, "tag_id": 1}),
                json!({"post_id": 1, "tag_id": 2}),
                json!({"post_id": 1, "tag_id": 3}),
                json!({"post_id": 2, "tag_id": 2}),
                json!({"post_id": 2, "tag_id": 4}),
            ],
        )
        .unwrap();
    store
}

pub fn computed() -> ComputedAttributes {
    ComputedAttributes::new()
        .with("post", "excerpt", |fields| {
            let title = fields.get("title").and_then(Value::as_str).unwrap_or("");
            Value::from(title.chars().take(4).collect::<String>())
        })
        .with("user", "display_name", |fields| {
            let name = fields.get("name").and_then(Value::as_str).unwrap_or("");
            Value::from(format!("@{}", name.to_lowercase()))
        })
}

pub fn controller(store: Arc<dyn ResourceStore>) -> ResourceController {
    ResourceController::new(Arc::new(registry()), ResourceConfig::default(), store)
        .with_computer(Arc::new(computed()))
}

pub fn controller_with_events(
    store: Arc<dyn ResourceStore>,
    events: Arc<RecordingEventBus>,
) -> ResourceController {
    controller(store).with_events(events)
}

/// Which store call a [`FailingStore`] breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    /// The write goes through, then the call reports failure
    Insert,
    Update,
    Delete,
    Commit,
}

/// Wraps a [`MemoryStore`] and fails one kind of call
pub struct FailingStore {
    pub inner: Arc<MemoryStore>,
    pub fail_at: FailAt,
}

impl FailingStore {
    pub fn new(inner: Arc<MemoryStore>, fail_at: FailAt) -> Self {
        Self { inner, fail_at }
    }

    fn fail(&self, at: FailAt) -> StoreResult<()> {
        if self.fail_at == at {
            Err(StoreError::Backend(format!("injected failure at {:?}", at)))
        } else {
            Ok(())
        }
    }
}

impl ResourceStore for FailingStore {
    fn fetch(&self, plan: &QueryPlan) -> StoreResult<Vec<Record>> {
        self.inner.fetch(plan)
    }

    fn count(&self, plan: &QueryPlan) -> StoreResult<u64> {
        self.inner.count(plan)
    }

    fn insert(&self, table: &str, primary_key: &str, values: Map<String, Value>) -> StoreResult<Value> {
        let key = self.inner.insert(table, primary_key, values)?;
        self.fail(FailAt::Insert)?;
        Ok(key)
    }

    fn update(
        &self,
        table: &str,
        primary_key: &str,
        key: &Value,
        values: Map<String, Value>,
    ) -> StoreResult<()> {
        self.inner.update(table, primary_key, key, values)?;
        self.fail(FailAt::Update)
    }

    fn delete(&self, table: &str, primary_key: &str, key: &Value) -> StoreResult<()> {
        self.inner.delete(table, primary_key, key)?;
        self.fail(FailAt::Delete)
    }

    fn begin(&self) -> StoreResult<()> {
        self.inner.begin()
    }

    fn commit(&self) -> StoreResult<()> {
        self.fail(FailAt::Commit)?;
        self.inner.commit()
    }

    fn rollback(&self) -> StoreResult<()> {
        self.inner.rollback()
    }
}

pub fn ids(data: &Value) -> Vec<i64> {
    data.as_array()
        .map(|items| items.iter().filter_map(|item| item["id"].as_i64()).collect())
        .unwrap_or_default()
}
