//! Loads resource schemas from JSON files at startup
//!
//! A schema file holds a JSON array of resource descriptors. Missing or
//! malformed files fail the load; there is no partial registry.

use std::fs;
use std::path::Path;

use super::errors::{SchemaError, SchemaResult};
use super::registry::SchemaRegistry;
use super::types::ResourceSchema;

/// Reads schema files into a [`SchemaRegistry`]
pub struct SchemaLoader;

impl SchemaLoader {
    /// Loads a single schema file.
    pub fn load_file(path: &Path) -> SchemaResult<SchemaRegistry> {
        Self::load_files(&[path])
    }

    /// Loads several schema files into one registry.
    ///
    /// Relations may point across files.
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> SchemaResult<SchemaRegistry> {
        let mut builder = SchemaRegistry::builder();
        for path in paths {
            for schema in Self::read_schemas(path.as_ref())? {
                builder.add(schema)?;
            }
        }
        builder.build()
    }

    /// Parses schemas from a JSON string.
    pub fn parse(source_name: &str, content: &str) -> SchemaResult<Vec<ResourceSchema>> {
        serde_json::from_str(content)
            .map_err(|e| SchemaError::malformed(source_name, format!("Invalid JSON: {}", e)))
    }

    fn read_schemas(path: &Path) -> SchemaResult<Vec<ResourceSchema>> {
        let content = fs::read_to_string(path).map_err(|e| {
            SchemaError::malformed(
                path.display().to_string(),
                format!("Failed to read file: {}", e),
            )
        })?;
        Self::parse(&path.display().to_string(), &content)
    }
}
