//! CLI module for resourceql
//!
//! Provides command-line interface for:
//! - explain: compile one request against schema files and print the plan
//! - check-schema: validate schema files

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, ExplainArgs, LogLevel};
pub use commands::{check_schema, explain, explain_plan, run, run_command};
pub use errors::{CliError, CliResult};
pub use io::{write_error, write_response, write_text};
