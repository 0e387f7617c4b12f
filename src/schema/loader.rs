//! Stream schema loaders

use crate::error::{Error, Result};
use crate::template::{InterpolatedString, TemplateContext};
use crate::types::JsonValue;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Draft of the JSON schemas produced for empty loaders
pub const JSON_SCHEMA_DRAFT: &str = "http://json-schema.org/draft-07/schema#";

/// Where a stream's JSON schema comes from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaLoader {
    /// An open object schema
    #[default]
    #[serde(alias = "EmptySchemaLoader")]
    Empty,
    /// Schema embedded in the manifest
    #[serde(alias = "InlineSchemaLoader")]
    Inline {
        /// The schema
        schema: JsonValue,
    },
    /// Schema read from a JSON file
    #[serde(alias = "JsonFileSchemaLoader")]
    JsonFile {
        /// Path template over `config` and `parameters`
        #[serde(default = "default_file_path")]
        file_path: InterpolatedString,
        /// Directory relative paths resolve against
        #[serde(skip)]
        base_dir: Option<PathBuf>,
    },
}

fn default_file_path() -> InterpolatedString {
    InterpolatedString::new("schemas/{{ parameters.name }}.json").unwrap_or_default()
}

impl SchemaLoader {
    /// Inline schema
    pub fn inline(schema: JsonValue) -> Self {
        Self::Inline { schema }
    }

    /// Resolve relative file paths against `dir`
    #[must_use]
    pub fn with_base_dir(self, dir: impl AsRef<Path>) -> Self {
        match self {
            Self::JsonFile { file_path, .. } => Self::JsonFile {
                file_path,
                base_dir: Some(dir.as_ref().to_path_buf()),
            },
            other => other,
        }
    }

    /// Load the schema
    pub fn load(&self, ctx: &TemplateContext) -> Result<JsonValue> {
        let schema = match self {
            Self::Empty => json!({
                "$schema": JSON_SCHEMA_DRAFT,
                "type": "object",
                "properties": {},
            }),
            Self::Inline { schema } => schema.clone(),
            Self::JsonFile {
                file_path,
                base_dir,
            } => {
                let rendered = file_path.render(ctx)?;
                let path = match base_dir {
                    Some(dir) if Path::new(&rendered).is_relative() => dir.join(&rendered),
                    _ => PathBuf::from(&rendered),
                };
                debug!(path = %path.display(), "Loading schema file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|_| Error::FileNotFound {
                        path: path.display().to_string(),
                    })?;
                serde_json::from_str(&contents).map_err(|e| {
                    Error::config(format!("Invalid JSON schema in {}: {e}", path.display()))
                })?
            }
        };
        if !schema.is_object() {
            return Err(Error::config("Stream schema must be a JSON object"));
        }
        Ok(schema)
    }
}
