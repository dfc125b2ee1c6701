//! Lifecycle Tests
//!
//! End-to-end behavior of the resource controller over the in-memory store:
//! - list paging metadata and links
//! - nested includes with per-parent windows
//! - not-found stops after the existence check
//! - lifecycle event ordering
//! - rollback on every mutation failure path
//! - reads never mutate

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use resourceql::config::ResourceConfig;
use resourceql::controller::{
    ApiError, OperationKind, RecordingEventBus, RequiredFields, ResourceController, ResourceRequest,
    ResourceTarget,
};
use resourceql::query::RequestParams;
use resourceql::store::MemoryStore;
use serde_json::{json, Value};

use common::{controller, controller_with_events, ids, registry, seeded_store, FailAt, FailingStore};

const POSTS_URL: &str = "https://api.example.com/posts";

fn request(params: RequestParams) -> ResourceRequest {
    ResourceRequest::new(POSTS_URL).with_params(params)
}

// =============================================================================
// List
// =============================================================================

#[test]
fn test_list_middle_page_has_both_links() {
    let controller = controller(seeded_store());
    let params = RequestParams::default().with_limit(10).with_offset(10);

    let response = controller.list("post", &request(params)).unwrap();
    let paging = response.meta().paging.clone().unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(ids(response.data()), (11..=20).collect::<Vec<_>>());
    assert_eq!(paging.total, 25);
    assert_eq!(
        paging.links.next.as_deref(),
        Some("https://api.example.com/posts?limit=10&offset=20")
    );
    assert_eq!(
        paging.links.previous.as_deref(),
        Some("https://api.example.com/posts?limit=10&offset=0")
    );
}

#[test]
fn test_list_last_page_has_no_next() {
    let controller = controller(seeded_store());
    let params = RequestParams::default().with_offset(20);

    let response = controller.list("post", &request(params)).unwrap();
    let paging = response.meta().paging.clone().unwrap();

    assert_eq!(ids(response.data()), (21..=25).collect::<Vec<_>>());
    assert!(paging.links.next.is_none());
    assert_eq!(
        paging.links.previous.as_deref(),
        Some("https://api.example.com/posts?offset=10")
    );
}

#[test]
fn test_list_filter_order_and_total() {
    let controller = controller(seeded_store());
    let params = RequestParams::default()
        .with_filters("user_id eq 1")
        .with_order("id desc")
        .with_limit(3);

    let response = controller.list("post", &request(params)).unwrap();

    assert_eq!(ids(response.data()), vec![25, 23, 21]);
    assert_eq!(response.meta().paging.as_ref().unwrap().total, 13);
}

#[test]
fn test_list_default_fields_and_appends() {
    let controller = controller(seeded_store());
    let params = RequestParams::default().with_limit(1);

    let response = controller.list("post", &request(params)).unwrap();

    assert_eq!(
        response.data(),
        &json!([{"id": 1, "title": "Post 1", "excerpt": "Post"}])
    );
}

#[test]
fn test_list_limit_is_clamped() {
    let controller = controller(seeded_store());

    let response = controller
        .list("tag", &ResourceRequest::new("/tags").with_params(RequestParams::default().with_limit(5000)))
        .unwrap();
    assert_eq!(ids(response.data()), vec![1, 2, 3, 4]);

    let response = controller
        .list(
            "post",
            &request(RequestParams {
                limit: Some("0".to_string()),
                ..RequestParams::default()
            }),
        )
        .unwrap();
    assert_eq!(ids(response.data()), vec![1]);
}

#[test]
fn test_list_nested_direct_window() {
    let controller = controller(seeded_store());
    let params = RequestParams::default()
        .with_fields("title,comments.limit(2){body}")
        .with_filters("id le 2");

    let response = controller.list("post", &request(params)).unwrap();

    assert_eq!(
        response.data(),
        &json!([
            {
                "id": 1,
                "title": "Post 1",
                "comments": [
                    {"id": 5, "body": "Comment 5"},
                    {"id": 4, "body": "Comment 4"}
                ]
            },
            {
                "id": 2,
                "title": "Post 2",
                "comments": [
                    {"id": 7, "body": "Comment 7"},
                    {"id": 6, "body": "Comment 6"}
                ]
            }
        ])
    );
}

#[test]
fn test_list_chronological_window_with_offset() {
    let controller = controller(seeded_store());
    let params = RequestParams::default()
        .with_fields("id,comments.limit(2).offset(1).order(chronological){id}")
        .with_filters("id eq 1");

    let response = controller.list("post", &request(params)).unwrap();
    assert_eq!(ids(&response.data()[0]["comments"]), vec![2, 3]);
}

#[test]
fn test_list_through_join_rank_window() {
    let controller = controller(seeded_store());
    let params = RequestParams::default()
        .with_fields("id,tags.limit(2){name}")
        .with_filters("id le 2");

    let response = controller.list("post", &request(params)).unwrap();

    assert_eq!(
        response.data(),
        &json!([
            {"id": 1, "tags": [{"id": 1, "name": "rust"}, {"id": 2, "name": "sql"}]},
            {"id": 2, "tags": [{"id": 2, "name": "sql"}, {"id": 4, "name": "json"}]}
        ])
    );
}

#[test]
fn test_list_through_join_unbounded_when_not_enforced() {
    let store = seeded_store();
    let config = ResourceConfig {
        enforce_rank_window: false,
        ..ResourceConfig::default()
    };
    let controller = ResourceController::new(Arc::new(registry()), config, store);
    let params = RequestParams::default()
        .with_fields("id,tags.limit(2){name}")
        .with_filters("id eq 1");

    let response = controller.list("post", &request(params)).unwrap();
    assert_eq!(ids(&response.data()[0]["tags"]), vec![1, 2, 3]);
}

#[test]
fn test_list_owning_relation_hides_added_key() {
    let controller = controller(seeded_store());
    let params = RequestParams::default()
        .with_fields("title,author{name,display_name}")
        .with_filters("id eq 2");

    let response = controller.list("post", &request(params)).unwrap();

    assert_eq!(
        response.data(),
        &json!([{
            "id": 2,
            "title": "Post 2",
            "author": {"id": 2, "name": "Lin", "display_name": "@lin"}
        }])
    );
}

#[test]
fn test_list_nested_path_addressing() {
    let controller = controller(seeded_store());
    let params = RequestParams::default()
        .with_fields("id,comments.limit(1),comments.author{name}")
        .with_filters("id eq 1");

    let response = controller.list("post", &request(params)).unwrap();
    let comments = response.data()[0]["comments"].as_array().unwrap();

    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["author"], json!({"id": 2, "name": "Lin"}));
    assert!(comments[0].get("user_id").is_none());
    assert!(comments[0].get("post_id").is_none());
}

#[test]
fn test_list_rejects_bad_parameters() {
    let controller = controller(seeded_store());

    let err = controller
        .list("post", &request(RequestParams::default().with_filters("title eq")))
        .unwrap_err();
    assert_eq!(err.code(), "FILTER_SYNTAX_ERROR");
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

    let err = controller
        .list("post", &request(RequestParams::default().with_filters("excerpt eq \"x\"")))
        .unwrap_err();
    assert_eq!(err.code(), "DISALLOWED_FILTER_FIELD");

    let err = controller
        .list("post", &request(RequestParams::default().with_fields("title,comments{")))
        .unwrap_err();
    assert_eq!(err.code(), "SELECTION_SYNTAX_ERROR");

    let err = controller
        .list("post", &request(RequestParams::default().with_order("rating desc")))
        .unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_FIELD");
}

// =============================================================================
// Diagnostics
// =============================================================================

#[test]
fn test_query_capture_is_request_scoped() {
    let controller = controller(seeded_store());
    let params = RequestParams::default().with_fields("id,comments");

    let plain = controller.list("post", &request(params.clone())).unwrap();
    assert!(plain.meta().queries.is_none());
    assert!(plain.to_json()["meta"].get("queries_list").is_none());

    let debug = controller
        .list("post", &request(params).with_debug(true))
        .unwrap();
    let queries = debug.meta().queries_list.clone().unwrap();

    assert_eq!(debug.meta().queries, Some(3));
    assert!(queries[0].contains("FROM posts"));
    assert!(queries[1].contains("FROM comments"));
    assert!(queries[2].starts_with("SELECT COUNT(posts.id) FROM posts"));
}

#[test]
fn test_meta_time_is_rounded() {
    let controller = controller(seeded_store());
    let response = controller.fetch_one("post", &json!(1), &request(RequestParams::default())).unwrap();

    let time = response.meta().time;
    assert!(time >= 0.0);
    assert_eq!((time * 1000.0).round() / 1000.0, time);
    assert!(response.meta().paging.is_none());
}

// =============================================================================
// Fetch One
// =============================================================================

#[test]
fn test_fetch_one_with_includes() {
    let controller = controller(seeded_store());
    let params = RequestParams::default().with_fields("name,profile,posts.limit(1){title}");

    let response = controller
        .fetch_one("user", &json!(1), &ResourceRequest::new("/users/1").with_params(params))
        .unwrap();

    assert_eq!(
        response.data(),
        &json!({
            "id": 1,
            "name": "Ada",
            "profile": {"id": 1, "bio": "Analyst"},
            "posts": [{"id": 25, "title": "Post 25"}]
        })
    );
}

#[test]
fn test_fetch_one_not_found_stops_after_existence_check() {
    let store = seeded_store();
    let events = Arc::new(RecordingEventBus::new());
    let controller = controller_with_events(store.clone(), events.clone());
    let params = RequestParams::default().with_fields("id,comments,tags");

    let before = store.executed();
    let err = controller
        .fetch_one("post", &json!(999), &request(params))
        .unwrap_err();

    assert!(matches!(err, ApiError::NotFound { .. }));
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(store.executed() - before, 1);
    assert!(events.events().is_empty());
}

#[test]
fn test_reads_are_idempotent() {
    let store = seeded_store();
    let controller = controller(store.clone());
    let params = RequestParams::default()
        .with_fields("title,excerpt,comments.limit(2),tags.limit(1)")
        .with_filters("id le 5")
        .with_order("id desc");
    let snapshot = store.rows("posts").unwrap();

    let first = controller.list("post", &request(params.clone())).unwrap();
    let second = controller.list("post", &request(params)).unwrap();
    assert_eq!(first.data(), second.data());
    assert_eq!(first.meta().paging, second.meta().paging);

    let one = controller.fetch_one("post", &json!(3), &request(RequestParams::default())).unwrap();
    let again = controller.fetch_one("post", &json!(3), &request(RequestParams::default())).unwrap();
    assert_eq!(one.data(), again.data());

    assert_eq!(store.rows("posts").unwrap(), snapshot);
}

// =============================================================================
// Fetch Relation
// =============================================================================

#[test]
fn test_fetch_relation_to_many() {
    let controller = controller(seeded_store());
    let params = RequestParams::default().with_limit(2);

    let response = controller
        .fetch_relation("user", &json!(1), "posts", &ResourceRequest::new("/users/1/posts").with_params(params))
        .unwrap();

    assert_eq!(
        response.data(),
        &json!([
            {"id": 25, "title": "Post 25", "excerpt": "Post"},
            {"id": 23, "title": "Post 23", "excerpt": "Post"}
        ])
    );
}

#[test]
fn test_fetch_relation_with_fields_and_offset() {
    let controller = controller(seeded_store());
    let params = RequestParams::default()
        .with_fields("body")
        .with_limit(2)
        .with_offset(1);

    let response = controller
        .fetch_relation("post", &json!(1), "comments", &request(params))
        .unwrap();
    assert_eq!(
        response.data(),
        &json!([{"id": 4, "body": "Comment 4"}, {"id": 3, "body": "Comment 3"}])
    );
}

#[test]
fn test_fetch_relation_to_one_and_unknown() {
    let events = Arc::new(RecordingEventBus::new());
    let controller = controller_with_events(seeded_store(), events.clone());

    let response = controller
        .fetch_relation("post", &json!(4), "author", &request(RequestParams::default()))
        .unwrap();
    assert_eq!(response.data(), &json!({"id": 2, "name": "Lin"}));
    assert_eq!(events.names(), vec!["user.retrieved"]);

    let err = controller
        .fetch_relation("post", &json!(4), "editor", &request(RequestParams::default()))
        .unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_RELATION");

    let err = controller
        .fetch_relation("post", &json!(404), "author", &request(RequestParams::default()))
        .unwrap_err();
    assert_eq!(err.code(), "RESOURCE_NOT_FOUND");
}

// =============================================================================
// Mutations and Events
// =============================================================================

#[test]
fn test_create_emits_events_in_order() {
    let store = seeded_store();
    let events = Arc::new(RecordingEventBus::new());
    let controller = controller_with_events(store.clone(), events.clone());
    let request = ResourceRequest::new(POSTS_URL).with_payload(json!({
        "title": "Fresh",
        "body": "New post",
        "user_id": 1,
        "_token": "csrf"
    }));

    let response = controller.create("post", &request).unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.envelope.message.as_deref(), Some("Resource created successfully"));
    assert_eq!(response.data(), &json!({"id": 26}));
    assert_eq!(events.names(), vec!["post.creating", "post.created"]);
    assert_eq!(events.events()[1].key, Some(json!(26)));
    assert!(!store.in_transaction());

    let fetched = controller.fetch_one("post", &json!(26), &ResourceRequest::new(POSTS_URL)).unwrap();
    assert_eq!(fetched.data()["title"], "Fresh");
}

#[test]
fn test_update_and_delete_events() {
    let store = seeded_store();
    let events = Arc::new(RecordingEventBus::new());
    let controller = controller_with_events(store.clone(), events.clone());

    let update = ResourceRequest::new(POSTS_URL).with_payload(json!({"title": "Renamed"}));
    let response = controller.update("post", &json!(3), &update).unwrap();
    assert_eq!(response.data(), &json!({"id": 3}));
    assert_eq!(response.envelope.message.as_deref(), Some("Resource updated successfully"));

    let response = controller.delete("post", &json!(4), &ResourceRequest::new(POSTS_URL)).unwrap();
    assert_eq!(response.data(), &Value::Null);
    assert_eq!(response.envelope.message.as_deref(), Some("Resource deleted successfully"));

    assert_eq!(
        events.names(),
        vec!["post.updating", "post.updated", "post.deleting", "post.deleted"]
    );
    let rows = store.rows("posts").unwrap();
    assert_eq!(rows.len(), 24);
    assert!(rows.iter().any(|row| row["id"] == 3 && row["title"] == "Renamed"));
}

#[test]
fn test_mutation_not_found_rolls_back() {
    let store = seeded_store();
    let events = Arc::new(RecordingEventBus::new());
    let controller = controller_with_events(store.clone(), events.clone());

    let update = ResourceRequest::new(POSTS_URL).with_payload(json!({"title": "Ghost"}));
    let err = controller.update("post", &json!(404), &update).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

    let err = controller
        .delete("post", &json!(404), &ResourceRequest::new(POSTS_URL))
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

    assert!(!store.in_transaction());
    assert!(events.events().is_empty());
}

#[test]
fn test_validation_failure_touches_nothing() {
    let store = seeded_store();
    let events = Arc::new(RecordingEventBus::new());
    let controller = controller_with_events(store.clone(), events.clone())
        .with_validator(OperationKind::Create, Arc::new(RequiredFields::new(["title", "user_id"])));
    let request = ResourceRequest::new(POSTS_URL).with_payload(json!({"body": "untitled"}));

    let before = store.executed();
    let err = controller.create("post", &request).unwrap_err();

    match &err {
        ApiError::ValidationFailed { messages } => assert_eq!(messages.len(), 2),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(store.executed(), before);
    assert_eq!(store.rows("posts").unwrap().len(), 25);
    assert!(!store.in_transaction());
    assert!(events.events().is_empty());
}

#[test]
fn test_failed_insert_rolls_back() {
    let inner = seeded_store();
    let events = Arc::new(RecordingEventBus::new());
    let failing = Arc::new(FailingStore::new(inner.clone(), FailAt::Insert));
    let controller = controller_with_events(failing, events.clone());
    let request = ResourceRequest::new(POSTS_URL).with_payload(json!({"title": "Doomed", "user_id": 1}));

    let err = controller.create("post", &request).unwrap_err();

    assert_eq!(err.code(), "STORE_BACKEND_ERROR");
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(inner.rows("posts").unwrap().len(), 25);
    assert!(!inner.in_transaction());
    assert_eq!(events.names(), vec!["post.creating"]);
}

#[test]
fn test_failed_commit_rolls_back() {
    let inner = seeded_store();
    let events = Arc::new(RecordingEventBus::new());
    let failing = Arc::new(FailingStore::new(inner.clone(), FailAt::Commit));
    let controller = controller_with_events(failing, events.clone());

    let update = ResourceRequest::new(POSTS_URL).with_payload(json!({"title": "Never"}));
    assert!(controller.update("post", &json!(1), &update).is_err());
    assert!(controller
        .delete("post", &json!(2), &ResourceRequest::new(POSTS_URL))
        .is_err());

    let rows = inner.rows("posts").unwrap();
    assert_eq!(rows.len(), 25);
    assert!(rows.iter().any(|row| row["id"] == 1 && row["title"] == "Post 1"));
    assert!(!inner.in_transaction());
    assert_eq!(events.names(), vec!["post.updating", "post.deleting"]);
}

#[test]
fn test_failed_update_and_delete_roll_back() {
    for fail_at in [FailAt::Update, FailAt::Delete] {
        let inner = seeded_store();
        let controller = controller(Arc::new(FailingStore::new(inner.clone(), fail_at)));

        let update = ResourceRequest::new(POSTS_URL).with_payload(json!({"title": "Partial"}));
        let _ = controller.update("post", &json!(5), &update);
        let _ = controller.delete("post", &json!(5), &ResourceRequest::new(POSTS_URL));

        let rows = inner.rows("posts").unwrap();
        let post = rows.iter().find(|row| row["id"] == 5);
        match fail_at {
            FailAt::Update => {
                // The delete succeeded
                assert!(post.is_none());
                assert_eq!(rows.len(), 24);
            }
            _ => {
                let post = post.unwrap();
                assert_eq!(post["title"], "Partial");
                assert_eq!(rows.len(), 25);
            }
        }
        assert!(!inner.in_transaction());
    }
}

#[test]
fn test_rejected_pre_event_rolls_back() {
    let store = seeded_store();
    let events = Arc::new(RecordingEventBus::rejecting("post.creating"));
    let controller = controller_with_events(store.clone(), events.clone());
    let request = ResourceRequest::new(POSTS_URL).with_payload(json!({"title": "Vetoed"}));

    let err = controller.create("post", &request).unwrap_err();

    assert_eq!(err.code(), "EVENT_REJECTED");
    assert_eq!(store.rows("posts").unwrap().len(), 25);
    assert!(!store.in_transaction());
    assert_eq!(events.names(), vec!["post.creating"]);
}

// =============================================================================
// Dispatch
// =============================================================================

#[test]
fn test_respond_times_failed_operations() {
    let controller = controller(seeded_store()).with_validator(
        OperationKind::FetchOne,
        Arc::new(|_: &str, _: &ResourceRequest| -> Result<(), Vec<String>> {
            std::thread::sleep(Duration::from_millis(20));
            Err(vec!["The key is malformed.".to_string()])
        }),
    );

    let response = controller.respond(
        OperationKind::FetchOne,
        &ResourceTarget::member("post", json!(1)),
        &ResourceRequest::new(POSTS_URL),
    );

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.data(), &Value::Null);
    assert_eq!(
        response.envelope.message.as_deref(),
        Some("Validation failed: The key is malformed.")
    );
    assert!(response.meta().time >= 0.02);

    let ok = controller.respond(
        OperationKind::List,
        &ResourceTarget::collection("tag"),
        &ResourceRequest::new("/tags"),
    );
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ids(ok.data()), vec![1, 2, 3, 4]);
}

#[test]
fn test_handle_routes_every_kind() {
    let store = Arc::new(MemoryStore::new());
    store.seed("tags", vec![json!({"id": 1, "name": "rust"})]).unwrap();
    let controller = controller(store.clone());
    let url = ResourceRequest::new("/tags");

    let created = controller
        .handle(
            OperationKind::Create,
            &ResourceTarget::collection("tag"),
            &url.clone().with_payload(json!({"name": "sql"})),
        )
        .unwrap();
    let key = created.data()["id"].clone();
    assert_eq!(key, json!(2));

    let listed = controller
        .handle(OperationKind::List, &ResourceTarget::collection("tag"), &url)
        .unwrap();
    assert_eq!(ids(listed.data()), vec![1, 2]);

    controller
        .handle(
            OperationKind::Update,
            &ResourceTarget::member("tag", key.clone()),
            &url.clone().with_payload(json!({"name": "postgres"})),
        )
        .unwrap();
    let fetched = controller
        .handle(OperationKind::FetchOne, &ResourceTarget::member("tag", key.clone()), &url)
        .unwrap();
    assert_eq!(fetched.data(), &json!({"id": 2, "name": "postgres"}));

    controller
        .handle(OperationKind::Delete, &ResourceTarget::member("tag", key), &url)
        .unwrap();
    assert_eq!(store.rows("tags").unwrap().len(), 1);
}
