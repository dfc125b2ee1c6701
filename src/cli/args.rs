//! CLI argument definitions using clap
//!
//! Commands:
//! - resourceql explain --schema <file> --resource <name> [query parameters]
//! - resourceql check-schema --schema <file>

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::observability::Severity;

/// resourceql - compile REST query parameters into relational plans
#[derive(Parser, Debug)]
#[command(name = "resourceql")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Minimum log severity
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Info,
    Warn,
    Error,
    Fatal,
}

impl From<LogLevel> for Severity {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Severity::Trace,
            LogLevel::Info => Severity::Info,
            LogLevel::Warn => Severity::Warn,
            LogLevel::Error => Severity::Error,
            LogLevel::Fatal => Severity::Fatal,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the plan compiled for one request
    Explain(ExplainArgs),

    /// Validate schema files and list their resources
    CheckSchema {
        /// Schema file; repeat to load several
        #[arg(long, required = true)]
        schema: Vec<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ExplainArgs {
    /// Schema file; repeat to load several
    #[arg(long, required = true)]
    pub schema: Vec<PathBuf>,

    /// Resource configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Entity type to query
    #[arg(long)]
    pub resource: String,

    /// Field and include selection, e.g. `id,comments.limit(5){id,body}`
    #[arg(long)]
    pub fields: Option<String>,

    /// Filter expression, e.g. `name eq "Milk" and price lt 2.55`
    #[arg(long)]
    pub filters: Option<String>,

    /// Order list, e.g. `name desc,id`
    #[arg(long)]
    pub order: Option<String>,

    #[arg(long)]
    pub limit: Option<String>,

    #[arg(long)]
    pub offset: Option<String>,

    /// Print the plan as JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_explain() {
        let cli = Cli::try_parse_from([
            "resourceql",
            "explain",
            "--schema",
            "blog.json",
            "--resource",
            "post",
            "--fields",
            "id,comments.limit(5)",
            "--limit",
            "20",
        ])
        .unwrap();

        match cli.command {
            Command::Explain(args) => {
                assert_eq!(args.resource, "post");
                assert_eq!(args.fields.as_deref(), Some("id,comments.limit(5)"));
                assert_eq!(args.limit.as_deref(), Some("20"));
                assert!(!args.json);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_log_level_values() {
        let cli = Cli::try_parse_from([
            "resourceql",
            "--log-level",
            "trace",
            "check-schema",
            "--schema",
            "a.json",
        ])
        .unwrap();
        assert_eq!(Severity::from(cli.log_level), Severity::Trace);

        let err = Cli::try_parse_from([
            "resourceql",
            "--log-level",
            "loud",
            "check-schema",
            "--schema",
            "a.json",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
        assert!(err.to_string().contains("warn"));
    }

    #[test]
    fn test_check_schema_requires_file() {
        assert!(Cli::try_parse_from(["resourceql", "check-schema"]).is_err());
        let cli = Cli::try_parse_from([
            "resourceql",
            "check-schema",
            "--schema",
            "a.json",
            "--schema",
            "b.json",
        ])
        .unwrap();
        match cli.command {
            Command::CheckSchema { schema } => assert_eq!(schema.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
