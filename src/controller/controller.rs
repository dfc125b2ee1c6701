//! # Resource Lifecycle Controller
//!
//! Drives the six operations over one schema registry and store:
//!
//! - reads parse the request, plan includes, compile, run `modify` hooks,
//!   fetch, compute appends and emit `<entity>.retrieved`
//! - mutations run inside a [`TransactionGuard`] and emit a pre event
//!   before persisting and a post event after commit
//!
//! Validators run first, before any data access. Every operation is wrapped
//! in an [`ObservationScope`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};

use super::context::{OperationContext, ResourceRequest};
use super::errors::{ApiError, ApiResult};
use super::events::{EventBus, EventPhase, LifecycleEvent, NullEventBus};
use super::hooks::{QueryModifier, RequestValidator};
use super::operation::OperationKind;
use super::transaction::TransactionGuard;
use crate::config::ResourceConfig;
use crate::observability::{Logger, ObservationScope, Severity};
use crate::planner::{
    render_count, render_edge, render_select, IncludeTree, PlanError, QueryPlan, QueryPlanBuilder,
};
use crate::query::{FilterExpr, QueryError, QueryRequest, RequestParams};
use crate::response::{
    AppendProcessor, AttributeComputer, ComputedAttributes, Envelope, PaginationBuilder,
    ResourceResponse,
};
use crate::schema::{ResourceSchema, SchemaRegistry};
use crate::store::{Record, ResourceStore};

/// What an operation addresses: a collection, a member, or a member's relation
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceTarget {
    pub entity: String,
    pub key: Option<Value>,
    pub relation: Option<String>,
}

impl ResourceTarget {
    pub fn collection(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key: None,
            relation: None,
        }
    }

    pub fn member(entity: impl Into<String>, key: Value) -> Self {
        Self {
            entity: entity.into(),
            key: Some(key),
            relation: None,
        }
    }

    pub fn relation(entity: impl Into<String>, key: Value, relation: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key: Some(key),
            relation: Some(relation.into()),
        }
    }
}

pub struct ResourceController {
    registry: Arc<SchemaRegistry>,
    config: ResourceConfig,
    store: Arc<dyn ResourceStore>,
    events: Arc<dyn EventBus>,
    computer: Arc<dyn AttributeComputer>,
    validators: HashMap<OperationKind, Arc<dyn RequestValidator>>,
    modifiers: Vec<Arc<dyn QueryModifier>>,
}

impl ResourceController {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        config: ResourceConfig,
        store: Arc<dyn ResourceStore>,
    ) -> Self {
        Self {
            registry,
            config,
            store,
            events: Arc::new(NullEventBus),
            computer: Arc::new(ComputedAttributes::new()),
            validators: HashMap::new(),
            modifiers: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_computer(mut self, computer: Arc<dyn AttributeComputer>) -> Self {
        self.computer = computer;
        self
    }

    /// Registers the validator for one operation kind, replacing any other
    pub fn with_validator(mut self, kind: OperationKind, validator: Arc<dyn RequestValidator>) -> Self {
        self.validators.insert(kind, validator);
        self
    }

    /// Modifiers run in registration order
    pub fn with_modifier(mut self, modifier: Arc<dyn QueryModifier>) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Runs the operation `kind` names against `target`
    pub fn handle(
        &self,
        kind: OperationKind,
        target: &ResourceTarget,
        request: &ResourceRequest,
    ) -> ApiResult<ResourceResponse> {
        let entity = target.entity.as_str();
        match kind {
            OperationKind::List => self.list(entity, request),
            OperationKind::Create => self.create(entity, request),
            OperationKind::FetchOne => self.fetch_one(entity, require_key(target)?, request),
            OperationKind::Update => self.update(entity, require_key(target)?, request),
            OperationKind::Delete => self.delete(entity, require_key(target)?, request),
            OperationKind::FetchRelation => {
                let relation = target.relation.as_deref().ok_or_else(|| QueryError::InvalidParam {
                    name: "relation".to_string(),
                    value: String::new(),
                })?;
                self.fetch_relation(entity, require_key(target)?, relation, request)
            }
        }
    }

    /// Like [`handle`](Self::handle), but failures become error envelopes
    /// carrying their status and the time spent before failing
    pub fn respond(
        &self,
        kind: OperationKind,
        target: &ResourceTarget,
        request: &ResourceRequest,
    ) -> ResourceResponse {
        let started = Instant::now();
        match self.handle(kind, target, request) {
            Ok(response) => response,
            Err(err) => err.into_resource_response(started.elapsed().as_secs_f64()),
        }
    }

    pub fn list(&self, entity: &str, request: &ResourceRequest) -> ApiResult<ResourceResponse> {
        self.observe(OperationKind::List, entity, request, |ctx| {
            self.validate(ctx.kind, entity, request)?;
            let schema = self.schema(entity)?;

            let query = QueryRequest::parse(&request.params)?;
            let compiled = self.builder().compile(entity, &query)?;
            let mut plan = compiled.plan;
            self.modify(ctx.kind, &mut plan);

            let mut records = self.fetch(ctx, &plan)?;
            self.process(&compiled.tree, &mut records);
            self.emit(
                LifecycleEvent::new(entity, EventPhase::Retrieved, ctx.request_id)
                    .with_records(records.len()),
            )?;

            let total = self.count(ctx, &plan)?;
            let limit = plan
                .limit
                .unwrap_or_else(|| query.effective_limit(&self.config, schema.max_limit));
            let paging = PaginationBuilder::new(&request.base_url, &request.params, limit, plan.offset)
                .build(total);

            let data = Value::Array(records.iter().map(Record::to_json).collect());
            Ok(ResourceResponse::ok(Envelope::new(data, ctx.meta().with_paging(paging))))
        })
    }

    pub fn fetch_one(
        &self,
        entity: &str,
        key: &Value,
        request: &ResourceRequest,
    ) -> ApiResult<ResourceResponse> {
        self.observe(OperationKind::FetchOne, entity, request, |ctx| {
            self.validate(ctx.kind, entity, request)?;
            let schema = self.schema(entity)?;

            let (tree, mut record) = self.locate(ctx, schema, &request.params, key)?;
            self.process(&tree, std::slice::from_mut(&mut record));
            self.emit(
                LifecycleEvent::new(entity, EventPhase::Retrieved, ctx.request_id).with_records(1),
            )?;

            Ok(ResourceResponse::ok(Envelope::new(record.to_json(), ctx.meta())))
        })
    }

    pub fn create(&self, entity: &str, request: &ResourceRequest) -> ApiResult<ResourceResponse> {
        self.observe(OperationKind::Create, entity, request, |ctx| {
            self.validate(ctx.kind, entity, request)?;
            let schema = self.schema(entity)?;
            let values = self.sanitize(schema, &request.payload, true);

            let guard = TransactionGuard::begin(self.store.as_ref(), entity)?;
            self.emit(LifecycleEvent::new(entity, EventPhase::Creating, ctx.request_id))?;
            let key = self.store.insert(&schema.table, &schema.primary_key, values)?;
            guard.commit()?;
            self.emit(
                LifecycleEvent::new(entity, EventPhase::Created, ctx.request_id).with_key(key.clone()),
            )?;

            Ok(ResourceResponse::created(
                Envelope::new(json!({ "id": key }), ctx.meta())
                    .with_message("Resource created successfully"),
            ))
        })
    }

    pub fn update(
        &self,
        entity: &str,
        key: &Value,
        request: &ResourceRequest,
    ) -> ApiResult<ResourceResponse> {
        self.observe(OperationKind::Update, entity, request, |ctx| {
            self.validate(ctx.kind, entity, request)?;
            let schema = self.schema(entity)?;
            let values = self.sanitize(schema, &request.payload, false);

            let guard = TransactionGuard::begin(self.store.as_ref(), entity)?;
            self.locate(ctx, schema, &key_only(schema), key)?;
            self.emit(
                LifecycleEvent::new(entity, EventPhase::Updating, ctx.request_id).with_key(key.clone()),
            )?;
            self.store
                .update(&schema.table, &schema.primary_key, key, values)?;
            guard.commit()?;
            self.emit(
                LifecycleEvent::new(entity, EventPhase::Updated, ctx.request_id).with_key(key.clone()),
            )?;

            Ok(ResourceResponse::ok(
                Envelope::new(json!({ "id": key }), ctx.meta())
                    .with_message("Resource updated successfully"),
            ))
        })
    }

    pub fn delete(
        &self,
        entity: &str,
        key: &Value,
        request: &ResourceRequest,
    ) -> ApiResult<ResourceResponse> {
        self.observe(OperationKind::Delete, entity, request, |ctx| {
            self.validate(ctx.kind, entity, request)?;
            let schema = self.schema(entity)?;

            let guard = TransactionGuard::begin(self.store.as_ref(), entity)?;
            self.locate(ctx, schema, &key_only(schema), key)?;
            self.emit(
                LifecycleEvent::new(entity, EventPhase::Deleting, ctx.request_id).with_key(key.clone()),
            )?;
            self.store.delete(&schema.table, &schema.primary_key, key)?;
            guard.commit()?;
            self.emit(
                LifecycleEvent::new(entity, EventPhase::Deleted, ctx.request_id).with_key(key.clone()),
            )?;

            Ok(ResourceResponse::ok(
                Envelope::new(Value::Null, ctx.meta()).with_message("Resource deleted successfully"),
            ))
        })
    }

    /// Returns one relation of a record, honoring the caller's `limit`,
    /// `offset` and `fields` for that relation
    pub fn fetch_relation(
        &self,
        entity: &str,
        key: &Value,
        relation: &str,
        request: &ResourceRequest,
    ) -> ApiResult<ResourceResponse> {
        self.observe(OperationKind::FetchRelation, entity, request, |ctx| {
            self.validate(ctx.kind, entity, request)?;
            let schema = self.schema(entity)?;
            let descriptor = schema.relation(relation).ok_or_else(|| PlanError::UnknownRelation {
                entity: entity.to_string(),
                relation: relation.to_string(),
            })?;
            let target_max = self
                .registry
                .get(&descriptor.target)
                .and_then(|target| target.max_limit);

            let query = QueryRequest::parse(&request.params)?;
            let limit = self.config.clamp_limit(query.limit, target_max);
            let params = RequestParams::default().with_fields(relation_selection(
                &schema.primary_key,
                relation,
                limit,
                query.offset,
                request.params.fields.as_deref(),
            ));

            let (tree, mut record) = self.locate(ctx, schema, &params, key)?;
            self.process(&tree, std::slice::from_mut(&mut record));

            let value = record.relations.get(relation);
            let count = value.map_or(0, |v| v.len());
            self.emit(
                LifecycleEvent::new(&descriptor.target, EventPhase::Retrieved, ctx.request_id)
                    .with_records(count),
            )?;

            let data = match value {
                Some(value) => value.to_json(),
                None if descriptor.kind.is_to_many() => Value::Array(Vec::new()),
                None => Value::Null,
            };
            Ok(ResourceResponse::ok(Envelope::new(data, ctx.meta())))
        })
    }

    fn observe<F>(
        &self,
        kind: OperationKind,
        entity: &str,
        request: &ResourceRequest,
        operation: F,
    ) -> ApiResult<ResourceResponse>
    where
        F: FnOnce(&mut OperationContext) -> ApiResult<ResourceResponse>,
    {
        let capture = self.config.capture_queries || request.debug;
        let mut ctx = OperationContext::new(kind, entity, capture);
        let request_id = ctx.request_id.to_string();
        let scope = ObservationScope::with_fields(
            kind.event_prefix(),
            &[("resource", entity), ("request_id", request_id.as_str())],
        );

        match operation(&mut ctx) {
            Ok(response) => {
                scope.complete_with_fields(&[("status", response.status.as_str())]);
                Ok(response)
            }
            Err(err) if err.is_client_error() => {
                scope.reject(&err.to_string());
                Err(err)
            }
            Err(err) => {
                scope.fail(&err.to_string());
                Err(err)
            }
        }
    }

    fn validate(&self, kind: OperationKind, entity: &str, request: &ResourceRequest) -> ApiResult<()> {
        let validator = match kind {
            OperationKind::FetchRelation => self
                .validators
                .get(&kind)
                .or_else(|| self.validators.get(&OperationKind::List)),
            _ => self.validators.get(&kind),
        };

        match validator {
            Some(validator) => validator
                .validate(entity, request)
                .map_err(|messages| ApiError::ValidationFailed { messages }),
            None => Ok(()),
        }
    }

    fn schema(&self, entity: &str) -> ApiResult<&ResourceSchema> {
        self.registry
            .get(entity)
            .map(|schema| schema.as_ref())
            .ok_or_else(|| PlanError::UnknownEntity(entity.to_string()).into())
    }

    fn builder(&self) -> QueryPlanBuilder<'_> {
        QueryPlanBuilder::new(&self.registry, &self.config)
    }

    fn modify(&self, kind: OperationKind, plan: &mut QueryPlan) {
        for modifier in &self.modifiers {
            modifier.modify(kind, plan);
        }
    }

    fn process(&self, tree: &IncludeTree, records: &mut [Record]) {
        AppendProcessor::new(self.computer.as_ref()).process(tree, records);
    }

    /// Fetches the single record with primary key `key`, or fails with
    /// `NotFound` after that one query
    fn locate(
        &self,
        ctx: &mut OperationContext,
        schema: &ResourceSchema,
        params: &RequestParams,
        key: &Value,
    ) -> ApiResult<(IncludeTree, Record)> {
        let mut query = QueryRequest::parse(params)?;
        let by_key = FilterExpr::eq(schema.primary_key.clone(), key.clone());
        query.filter = Some(match query.filter.take() {
            Some(filter) => FilterExpr::and(filter, by_key),
            None => by_key,
        });
        query.limit = Some(1);
        query.offset = 0;

        let compiled = self.builder().compile(&schema.entity, &query)?;
        let mut plan = compiled.plan;
        self.modify(ctx.kind, &mut plan);

        let record = self
            .fetch(ctx, &plan)?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found(&schema.entity, key.clone()))?;
        Ok((compiled.tree, record))
    }

    fn fetch(&self, ctx: &mut OperationContext, plan: &QueryPlan) -> ApiResult<Vec<Record>> {
        self.record(ctx, render_select(plan));
        for edge in plan.edges() {
            self.record(ctx, render_edge(edge));
        }
        Ok(self.store.fetch(plan)?)
    }

    fn count(&self, ctx: &mut OperationContext, plan: &QueryPlan) -> ApiResult<u64> {
        let unpaged = plan.without_paging();
        self.record(ctx, render_count(&unpaged));
        Ok(self.store.count(&unpaged)?)
    }

    fn record(&self, ctx: &mut OperationContext, sql: String) {
        if Logger::enabled(Severity::Trace) {
            Logger::trace("QUERY_EXECUTED", &[("resource", ctx.entity.as_str()), ("sql", sql.as_str())]);
        }
        ctx.record_query(sql);
    }

    fn emit(&self, event: LifecycleEvent) -> ApiResult<()> {
        self.events.dispatch(&event).map_err(|err| ApiError::Event {
            event: event.name(),
            reason: err.reason,
        })
    }

    /// Payload values that may be written: excluded pseudo-fields are
    /// stripped silently, unknown fields are dropped with a warning
    fn sanitize(
        &self,
        schema: &ResourceSchema,
        payload: &Map<String, Value>,
        allow_key: bool,
    ) -> Map<String, Value> {
        let mut values = Map::new();
        for (field, value) in payload {
            if self.config.is_excluded(field) {
                continue;
            }
            let writable = schema.has_field(field) && (allow_key || *field != schema.primary_key);
            if !writable {
                Logger::warn(
                    "PAYLOAD_FIELD_DROPPED",
                    &[("resource", schema.entity.as_str()), ("field", field.as_str())],
                );
                continue;
            }
            values.insert(field.clone(), value.clone());
        }
        values
    }
}

fn require_key(target: &ResourceTarget) -> ApiResult<&Value> {
    target.key.as_ref().ok_or_else(|| {
        QueryError::InvalidParam {
            name: "key".to_string(),
            value: String::new(),
        }
        .into()
    })
}

/// Selection used to resolve a mutation target: the primary key only
fn key_only(schema: &ResourceSchema) -> RequestParams {
    RequestParams::default().with_fields(schema.primary_key.clone())
}

/// `<pk>,<relation>.limit(n)[.offset(m)][{fields}]`
fn relation_selection(
    primary_key: &str,
    relation: &str,
    limit: u64,
    offset: u64,
    fields: Option<&str>,
) -> String {
    let mut selection = format!("{},{}.limit({})", primary_key, relation, limit);
    if offset > 0 {
        selection.push_str(&format!(".offset({})", offset));
    }
    if let Some(fields) = fields {
        selection.push('{');
        selection.push_str(fields);
        selection.push('}');
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::RecordingEventBus;
    use crate::schema::fixtures::blog_registry;
    use crate::store::MemoryStore;

    fn controller(store: Arc<MemoryStore>) -> ResourceController {
        ResourceController::new(Arc::new(blog_registry()), ResourceConfig::default(), store)
    }

    fn seeded() -> Arc<MemoryStore> {
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
                "posts",
                vec![
                    json!({"id": 1, "title": "First", "body": "a", "user_id": 1, "created_at": "2024-01-01"}),
                    json!({"id": 2, "title": "Second", "body": "b", "user_id": 2, "created_at": "2024-01-02"}),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_relation_selection() {
        assert_eq!(relation_selection("id", "comments", 10, 0, None), "id,comments.limit(10)");
        assert_eq!(
            relation_selection("id", "comments", 5, 10, Some("id,body")),
            "id,comments.limit(5).offset(10){id,body}"
        );
    }

    #[test]
    fn test_handle_requires_key() {
        let controller = controller(seeded());
        let err = controller
            .handle(
                OperationKind::FetchOne,
                &ResourceTarget::collection("post"),
                &ResourceRequest::new("/posts"),
            )
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_QUERY_PARAM");
    }

    #[test]
    fn test_handle_dispatches_by_kind() {
        let controller = controller(seeded());
        let response = controller
            .handle(
                OperationKind::FetchOne,
                &ResourceTarget::member("user", json!(2)),
                &ResourceRequest::new("/users/2"),
            )
            .unwrap();
        assert_eq!(response.data()["name"], "Lin");
    }

    #[test]
    fn test_unknown_resource() {
        let controller = controller(seeded());
        let err = controller
            .list("invoice", &ResourceRequest::new("/invoices"))
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_RESOURCE");
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_sanitize_drops_unknown_and_excluded() {
        let store = seeded();
        let controller = controller(store.clone());
        let request = ResourceRequest::new("/users").with_payload(json!({
            "name": "Kay",
            "_token": "csrf",
            "is_admin": true
        }));

        let response = controller.create("user", &request).unwrap();
        let key = response.data()["id"].clone();
        let rows = store.rows("users").unwrap();
        let row = rows.iter().find(|row| row["id"] == key).unwrap();

        assert_eq!(row["name"], "Kay");
        assert!(row.get("_token").is_none());
        assert!(row.get("is_admin").is_none());
    }

    #[test]
    fn test_update_keeps_primary_key() {
        let store = seeded();
        let controller = controller(store.clone());
        let request = ResourceRequest::new("/users/1").with_payload(json!({"id": 99, "name": "Ada L."}));

        let response = controller.update("user", &json!(1), &request).unwrap();
        assert_eq!(response.data(), &json!({"id": 1}));

        let rows = store.rows("users").unwrap();
        assert!(rows.iter().any(|row| row["id"] == 1 && row["name"] == "Ada L."));
        assert!(rows.iter().all(|row| row["id"] != 99));
    }

    #[test]
    fn test_modifier_sees_operation_kind() {
        struct NewestFirst;
        impl QueryModifier for NewestFirst {
            fn modify(&self, kind: OperationKind, plan: &mut QueryPlan) {
                if kind == OperationKind::List {
                    plan.order = vec![crate::planner::OrderClause::new(
                        plan.primary_column(),
                        crate::schema::SortDirection::Desc,
                    )];
                }
            }
        }

        let controller = controller(seeded()).with_modifier(Arc::new(NewestFirst));
        let response = controller.list("post", &ResourceRequest::new("/posts")).unwrap();
        assert_eq!(response.data()[0]["id"], 2);
        assert_eq!(response.data()[1]["id"], 1);
    }

    #[test]
    fn test_fetch_relation_uses_list_validator() {
        let events = Arc::new(RecordingEventBus::new());
        let controller = controller(seeded())
            .with_events(events.clone())
            .with_validator(
                OperationKind::List,
                Arc::new(|_: &str, _: &ResourceRequest| -> Result<(), Vec<String>> {
                    Err(vec!["listing disabled".to_string()])
                }),
            );

        let err = controller
            .fetch_relation("user", &json!(1), "posts", &ResourceRequest::new("/users/1/posts"))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert!(events.events().is_empty());
    }
}
