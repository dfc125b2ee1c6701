//! CLI command implementations
//!
//! Both commands load schema files into a registry first; a schema that
//! fails to load fails the command.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::config::ResourceConfig;
use crate::observability::{Logger, Severity};
use crate::planner::{ExplainPlan, PlanError, QueryPlan, QueryPlanBuilder};
use crate::query::{QueryRequest, RequestParams};
use crate::schema::{SchemaLoader, SchemaRegistry};

use super::args::{Cli, Command, ExplainArgs};
use super::errors::CliResult;
use super::io::{write_error, write_response, write_text};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    Logger::set_min_severity(Severity::from(cli.log_level));
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Explain(args) => explain(&args),
        Command::CheckSchema { schema } => check_schema(&schema),
    }
}

/// Compile one request and print its plan
///
/// A request the planner rejects is still a successful explain: the
/// rejection is the output. Malformed query parameters fail the command.
pub fn explain(args: &ExplainArgs) -> CliResult<()> {
    let registry = load_registry(&args.schema)?;
    let config = load_config(args.config.as_deref())?;

    match plan_request(&registry, &config, args)? {
        Ok(plan) if args.json => write_response(serde_json::to_value(&plan)?),
        Ok(plan) => write_text(&ExplainPlan::from_plan(&plan).to_string()),
        Err(err) if args.json => write_error(err.code(), &err.to_string()),
        Err(err) => write_text(&ExplainPlan::from_error(&err).to_string()),
    }
}

/// The explain plan `explain` prints in text mode
pub fn explain_plan(
    registry: &SchemaRegistry,
    config: &ResourceConfig,
    args: &ExplainArgs,
) -> CliResult<ExplainPlan> {
    Ok(match plan_request(registry, config, args)? {
        Ok(plan) => ExplainPlan::from_plan(&plan),
        Err(err) => ExplainPlan::from_error(&err),
    })
}

/// Validate schema files and print a summary of each resource
pub fn check_schema(paths: &[PathBuf]) -> CliResult<()> {
    let registry = load_registry(paths)?;
    write_response(schema_summary(&registry))
}

fn plan_request(
    registry: &SchemaRegistry,
    config: &ResourceConfig,
    args: &ExplainArgs,
) -> CliResult<Result<QueryPlan, PlanError>> {
    let params = RequestParams {
        fields: args.fields.clone(),
        filters: args.filters.clone(),
        order: args.order.clone(),
        limit: args.limit.clone(),
        offset: args.offset.clone(),
    };
    let request = QueryRequest::parse(&params)?;

    Ok(QueryPlanBuilder::new(registry, config)
        .compile(&args.resource, &request)
        .map(|compiled| compiled.plan))
}

fn load_registry(paths: &[PathBuf]) -> CliResult<SchemaRegistry> {
    let registry = SchemaLoader::load_files(paths)?;
    let count = registry.len().to_string();
    Logger::info("SCHEMA_LOADED", &[("resources", count.as_str())]);
    Ok(registry)
}

fn load_config(path: Option<&Path>) -> CliResult<ResourceConfig> {
    match path {
        Some(path) => Ok(ResourceConfig::from_path(path)?),
        None => Ok(ResourceConfig::default()),
    }
}

fn schema_summary(registry: &SchemaRegistry) -> Value {
    let resources: Vec<Value> = registry
        .entities()
        .filter_map(|entity| registry.get(entity))
        .map(|schema| {
            let relations: Vec<Value> = schema
                .relations
                .values()
                .map(|relation| {
                    json!({
                        "name": relation.name,
                        "target": relation.target,
                        "kind": relation.kind.as_str(),
                    })
                })
                .collect();
            json!({
                "entity": schema.entity,
                "table": schema.table,
                "primary_key": schema.primary_key,
                "fields": schema.fields,
                "appends": schema.appends,
                "relations": relations,
            })
        })
        .collect();

    json!({ "resources": resources })
}
