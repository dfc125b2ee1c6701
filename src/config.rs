//! Resource layer configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings shared by every resource controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Page size when the request carries no `limit` (default: 10)
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Upper bound for `limit`, unless a schema overrides it (default: 1000)
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,

    /// Payload keys dropped before create (default: ["_token"])
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Report executed plans in response meta (default: false)
    #[serde(default)]
    pub capture_queries: bool,

    /// Apply the rank bound on through-join windows (default: true)
    #[serde(default = "default_enforce_rank_window")]
    pub enforce_rank_window: bool,
}

fn default_limit() -> u64 {
    10
}

fn default_max_limit() -> u64 {
    1000
}

fn default_exclude() -> Vec<String> {
    vec!["_token".to_string()]
}

fn default_enforce_rank_window() -> bool {
    true
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            exclude: default_exclude(),
            capture_queries: false,
            enforce_rank_window: default_enforce_rank_window(),
        }
    }
}

impl ResourceConfig {
    /// Loads a JSON config file
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_limit == 0 {
            return Err(ConfigError::Invalid("max_limit must be positive".into()));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError::Invalid(format!(
                "default_limit must be within 1..={}",
                self.max_limit
            )));
        }
        Ok(())
    }

    pub fn with_capture_queries(mut self, capture: bool) -> Self {
        self.capture_queries = capture;
        self
    }

    /// Clamps a requested page size into `[1, max]`, where `max` is the
    /// schema override if present
    pub fn clamp_limit(&self, requested: Option<i64>, schema_max: Option<u64>) -> u64 {
        let max = schema_max.unwrap_or(self.max_limit).max(1);
        match requested {
            None => self.default_limit.clamp(1, max),
            Some(n) if n < 1 => 1,
            Some(n) => (n as u64).min(max),
        }
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        self.exclude.iter().any(|k| k == key)
    }
}
