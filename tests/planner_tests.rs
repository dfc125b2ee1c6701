//! Planner Tests
//!
//! Properties of compiled plans over the blog schema:
//! - the primary key is always selected, at the root and on every edge
//! - default selections compute appends without selecting them
//! - filter and selection parsing match the documented examples
//! - through-join windows carry the rank bound only when enforced

mod common;

use resourceql::config::ResourceConfig;
use resourceql::planner::{
    render_edge, render_select, Column, OrderClause, PlanError, QueryPlan, QueryPlanBuilder,
};
use resourceql::query::{parse_selection, FilterExpr, QueryRequest, RequestParams};
use resourceql::schema::{RelationKind, SchemaRegistry, SortDirection};
use serde_json::json;

use common::registry;

fn compile(
    registry: &SchemaRegistry,
    config: &ResourceConfig,
    entity: &str,
    params: RequestParams,
) -> Result<QueryPlan, PlanError> {
    let request = QueryRequest::parse(&params).unwrap();
    QueryPlanBuilder::new(registry, config)
        .compile(entity, &request)
        .map(|compiled| compiled.plan)
}

fn plan(entity: &str, params: RequestParams) -> QueryPlan {
    compile(&registry(), &ResourceConfig::default(), entity, params).unwrap()
}

// =============================================================================
// Primary Keys
// =============================================================================

#[test]
fn test_primary_key_always_selected() {
    let selections = [
        "title",
        "body,created_at",
        "excerpt",
        "comments{body}",
        "tags.limit(1){name}",
        "author{name},comments.author{email}",
        "comments.limit(2).order(chronological)",
    ];

    for fields in selections {
        let plan = plan("post", RequestParams::default().with_fields(fields));

        assert!(
            plan.select.contains(&plan.primary_column()),
            "root missing key for {}",
            fields
        );
        for edge in plan.edges() {
            assert!(
                edge.select.contains(&Column::new(&edge.table, &edge.primary_key)),
                "edge {} missing key for {}",
                edge.path,
                fields
            );
        }
    }
}

#[test]
fn test_explicit_fields_are_exact() {
    let plan = plan("post", RequestParams::default().with_fields("title"));
    assert_eq!(
        plan.select,
        vec![Column::new("posts", "id"), Column::new("posts", "title")]
    );
}

// =============================================================================
// Default Fields and Appends
// =============================================================================

#[test]
fn test_default_selection_excludes_appends_from_select() {
    let registry = registry();
    let config = ResourceConfig::default();
    let request = QueryRequest::parse(&RequestParams::default()).unwrap();

    let compiled = QueryPlanBuilder::new(&registry, &config)
        .compile("post", &request)
        .unwrap();

    assert_eq!(
        compiled.plan.select,
        vec![Column::new("posts", "id"), Column::new("posts", "title")]
    );
    assert_eq!(compiled.tree.root().appends, vec!["excerpt".to_string()]);
    assert!(!render_select(&compiled.plan).contains("excerpt"));
}

#[test]
fn test_default_include_adds_join_keys_as_hidden() {
    let registry = registry();
    let config = ResourceConfig::default();
    let request = QueryRequest::parse(&RequestParams::default().with_fields("id,comments,author")).unwrap();

    let compiled = QueryPlanBuilder::new(&registry, &config)
        .compile("post", &request)
        .unwrap();
    let tree = &compiled.tree;

    let comments = tree.get("comments").unwrap();
    assert_eq!(comments.fields, vec!["id", "body", "post_id"]);
    assert_eq!(comments.retained_foreign_key.as_deref(), Some("post_id"));
    assert!(comments.hidden.contains(&"post_id".to_string()));

    // The owning side needs the foreign key on the parent
    assert!(tree.root().fields.contains(&"user_id".to_string()));
    assert!(tree.root().hidden.contains(&"user_id".to_string()));
    assert!(tree.get("author").unwrap().appends.is_empty());
}

// =============================================================================
// Parsing Examples
// =============================================================================

#[test]
fn test_filter_example_ast_and_round_trip() {
    let input = "(name eq \"Milk\" or name eq \"Eggs\") and price lt 2.55";
    let expr = FilterExpr::parse(input).unwrap();

    assert_eq!(
        expr,
        FilterExpr::and(
            FilterExpr::or(
                FilterExpr::eq("name", json!("Milk")),
                FilterExpr::eq("name", json!("Eggs")),
            ),
            FilterExpr::lt("price", json!(2.55)),
        )
    );
    assert_eq!(FilterExpr::parse(&expr.to_string()).unwrap(), expr);
}

#[test]
fn test_selection_example() {
    let selection = parse_selection("id,comments.limit(5).order(chronological){id,body}").unwrap();
    let comments = selection.include("comments").unwrap();

    assert_eq!(selection.fields, vec!["id"]);
    assert_eq!(selection.includes.len(), 1);
    assert!(comments.explicit);
    assert_eq!(comments.fields, vec!["id", "body"]);
    assert_eq!(comments.limit, Some(5));
    assert_eq!(comments.order, Some(SortDirection::Asc));
}

// =============================================================================
// Filters and Order
// =============================================================================

#[test]
fn test_filter_compiles_to_qualified_predicate() {
    let plan = plan(
        "post",
        RequestParams::default()
            .with_filters("user_id eq 1 and not title eq \"Draft\"")
            .with_order("created_at desc"),
    );

    let predicate = plan.predicate.unwrap();
    assert!(predicate.sql.contains("posts.user_id = 1"));
    assert!(predicate.sql.contains("posts.title"));
    assert_eq!(
        plan.order,
        vec![OrderClause::new(
            Column::new("posts", "created_at"),
            SortDirection::Desc
        )]
    );
}

#[test]
fn test_filter_on_non_stored_field_rejected() {
    for filter in ["excerpt eq \"Post\"", "comments eq 1", "rating gt 3"] {
        let err = compile(
            &registry(),
            &ResourceConfig::default(),
            "post",
            RequestParams::default().with_filters(filter),
        )
        .unwrap_err();
        assert!(
            matches!(err, PlanError::DisallowedFilterField { .. }),
            "{} gave {:?}",
            filter,
            err
        );
    }
}

#[test]
fn test_unknown_names_rejected() {
    let registry = registry();
    let config = ResourceConfig::default();

    let err = compile(&registry, &config, "invoice", RequestParams::default()).unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_RESOURCE");

    let err = compile(
        &registry,
        &config,
        "post",
        RequestParams::default().with_fields("comments.likes"),
    )
    .unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_RELATION");

    let err = compile(
        &registry,
        &config,
        "post",
        RequestParams::default().with_fields("title,rating"),
    )
    .unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_FIELD");
}

// =============================================================================
// Limits and Windows
// =============================================================================

#[test]
fn test_root_limit_clamped_by_schema() {
    let plan = plan("tag", RequestParams::default().with_limit(5000).with_offset(3));
    assert_eq!(plan.limit, Some(50));
    assert_eq!(plan.offset, 3);

    let plan = plan_default_post();
    assert_eq!(plan.limit, Some(10));
}

fn plan_default_post() -> QueryPlan {
    plan("post", RequestParams::default())
}

#[test]
fn test_direct_window_only_when_requested() {
    let plan = plan(
        "post",
        RequestParams::default().with_fields("id,comments.offset(2),author"),
    );
    let edges = plan.edges();

    let comments = edges.iter().find(|e| e.path == "comments").unwrap();
    let window = comments.window.unwrap();
    assert_eq!(window.offset, 2);
    assert_eq!(window.limit, None);
    assert!(render_edge(comments).contains("PER PARENT OFFSET 2"));

    let author = edges.iter().find(|e| e.path == "author").unwrap();
    assert!(matches!(author.kind, RelationKind::ToOneOwning { .. }));
    assert!(author.window.is_none());
}

#[test]
fn test_ranked_window_bound_enforced() {
    let plan = plan(
        "post",
        RequestParams::default().with_fields("id,tags.limit(2).offset(1)"),
    );
    let tags = plan.edges()[0];
    let ranked = tags.ranked.as_ref().unwrap();

    assert_eq!(ranked.rank_filter(), Some((2, Some(3))));
    let sql = render_edge(tags);
    assert!(sql.contains("RIGHT JOIN post_tag"));
    assert!(sql.contains("BETWEEN 2 AND 3"));
}

#[test]
fn test_ranked_window_bound_not_enforced() {
    let config = ResourceConfig {
        enforce_rank_window: false,
        ..ResourceConfig::default()
    };
    let plan = compile(
        &registry(),
        &config,
        "post",
        RequestParams::default().with_fields("id,tags.limit(2)"),
    )
    .unwrap();
    let tags = plan.edges()[0];

    assert_eq!(tags.ranked.as_ref().unwrap().rank_filter(), None);
    assert!(!render_edge(tags).contains("BETWEEN"));
}

#[test]
fn test_ranked_edge_without_window() {
    let plan = plan("post", RequestParams::default().with_fields("id,tags"));
    let tags = plan.edges()[0];

    assert!(tags.window.is_none());
    assert_eq!(tags.ranked.as_ref().unwrap().rank_filter(), None);
    assert!(!render_edge(tags).contains("WHERE outer_query.rank"));
}
