//! Manifest types
//!
//! Declarative connector manifests as they appear in YAML after `$ref`
//! resolution and `$parameters` propagation.

use crate::auth::AuthDefinition;
use crate::decode::Decoder;
use crate::extract::{RecordSelector, RecordTransformation};
use crate::http::{RateLimiterConfig, RequestOption, RequesterDefinition};
use crate::pagination::PaginatorDefinition;
use crate::partition::PartitionRouter;
use crate::schema::SchemaLoader;
use crate::state::StateMigration;
use crate::template::InterpolatedString;
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;

// ============================================================================
// Manifest
// ============================================================================

/// Top-level connector manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Manifest {
    /// Manifest version
    #[serde(default = "default_version")]
    pub version: String,
    /// Reusable definitions referenced with `$ref`
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub definitions: JsonObject,
    /// Stream definitions
    pub streams: Vec<StreamDefinition>,
    /// Connection check
    #[serde(default)]
    pub check: CheckDefinition,
    /// Default read concurrency
    #[serde(default)]
    pub concurrency_level: Option<ConcurrencyLevel>,
    /// Connector specification
    #[serde(default)]
    pub spec: Option<SpecDefinition>,
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpDefinition,
    /// Directory of the manifest file, for relative schema paths
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl Manifest {
    /// Look up a stream definition
    pub fn stream(&self, name: &str) -> Option<&StreamDefinition> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// Stream names in manifest order
    pub fn stream_names(&self) -> Vec<&str> {
        self.streams.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Streams read by `check`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckDefinition {
    /// Stream names; the first stream when empty
    #[serde(default)]
    pub stream_names: Vec<String>,
}

/// Concurrency declared by the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyLevel {
    /// A number or a template over `config`
    pub default_concurrency: JsonValue,
    /// Upper bound applied to the resolved value
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

/// Connector specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecDefinition {
    /// JSON schema of the connector config
    #[serde(default)]
    pub connection_specification: JsonValue,
    /// Documentation link
    #[serde(default)]
    pub documentation_url: Option<String>,
}

impl SpecDefinition {
    /// Payload of the protocol `SPEC` message
    pub fn to_value(&self) -> JsonValue {
        let mut spec = json!({ "connectionSpecification": self.connection_specification });
        if let Some(url) = &self.documentation_url {
            spec["documentationUrl"] = json!(url);
        }
        spec
    }
}

// ============================================================================
// HTTP Definition
// ============================================================================

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpDefinition {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// User agent override
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Client-side rate limit
    #[serde(default)]
    pub rate_limit: Option<RateLimiterConfig>,
}

fn default_timeout() -> u64 {
    30
}

impl Default for HttpDefinition {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            user_agent: None,
            rate_limit: None,
        }
    }
}

// ============================================================================
// Stream Definition
// ============================================================================

/// One stream of the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDefinition {
    /// Stream name
    pub name: String,
    /// Primary key
    #[serde(default)]
    pub primary_key: Option<PrimaryKey>,
    /// How records are fetched
    pub retriever: RetrieverManifest,
    /// Datetime cursor; full refresh only when absent
    #[serde(default)]
    pub incremental_sync: Option<IncrementalSync>,
    /// Schema source
    #[serde(default)]
    pub schema_loader: SchemaLoader,
    /// Applied to each record after selection
    #[serde(default)]
    pub transformations: Vec<RecordTransformation>,
    /// Applied to incoming state
    #[serde(default)]
    pub state_migrations: Vec<StateMigration>,
    /// Parameters available as `parameters` in templates
    #[serde(default, rename = "$parameters")]
    pub parameters: JsonObject,
}

impl StreamDefinition {
    /// Parent streams of this stream's substream router
    pub fn parent_streams(&self) -> Vec<&str> {
        self.retriever
            .partition_router
            .as_ref()
            .map(PartitionRouter::parent_streams)
            .unwrap_or_default()
    }
}

/// Primary key in any of its manifest forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// `id`
    Field(String),
    /// `[id, account]`, one top-level field per entry
    Fields(Vec<String>),
    /// `[[account, id], [seq]]`
    Paths(Vec<Vec<String>>),
}

impl PrimaryKey {
    /// Key as field paths
    pub fn paths(&self) -> Vec<Vec<String>> {
        match self {
            Self::Field(field) => vec![vec![field.clone()]],
            Self::Fields(fields) => fields.iter().map(|f| vec![f.clone()]).collect(),
            Self::Paths(paths) => paths.clone(),
        }
    }
}

/// Retriever of a stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverManifest {
    /// HTTP request
    pub requester: RequesterManifest,
    /// Extraction and filtering
    #[serde(default)]
    pub record_selector: RecordSelector,
    /// Pagination
    #[serde(default)]
    pub paginator: PaginatorDefinition,
    /// Partitioning
    #[serde(default)]
    pub partition_router: Option<PartitionRouter>,
    /// Response format
    #[serde(default)]
    pub decoder: Decoder,
}

/// Requester with its authenticator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequesterManifest {
    /// Credentials
    #[serde(default)]
    pub authenticator: AuthDefinition,
    /// Request shape
    #[serde(flatten)]
    pub definition: RequesterDefinition,
}

// ============================================================================
// Incremental Sync
// ============================================================================

/// Datetime-based cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalSync {
    /// Record field holding the cursor
    pub cursor_field: String,
    /// Format of cursor values and window bounds
    #[serde(default)]
    pub datetime_format: Option<String>,
    /// First datetime to read; no windows when absent
    #[serde(default)]
    pub start_datetime: Option<DatetimeBound>,
    /// Last datetime to read; now when absent
    #[serde(default)]
    pub end_datetime: Option<DatetimeBound>,
    /// Window length
    #[serde(default)]
    pub step: Option<String>,
    /// Gap between consecutive windows
    #[serde(default)]
    pub cursor_granularity: Option<String>,
    /// Re-read this far behind the stored cursor
    #[serde(default)]
    pub lookback_window: Option<String>,
    /// Where to inject the window start
    #[serde(default)]
    pub start_time_option: Option<RequestOption>,
    /// Where to inject the window end
    #[serde(default)]
    pub end_time_option: Option<RequestOption>,
    /// Slice key of the window start
    #[serde(default)]
    pub partition_field_start: Option<String>,
    /// Slice key of the window end
    #[serde(default)]
    pub partition_field_end: Option<String>,
    /// Keep one cursor for all partitions of a partitioned stream
    #[serde(default)]
    pub global_substream_cursor: bool,
    /// Records between mid-partition checkpoints
    #[serde(default)]
    pub checkpoint_interval: Option<u64>,
}

/// Window bound: a `MinMaxDatetime` object, or a bare template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatetimeBound {
    /// `{ datetime: "...", datetime_format: "..." }`
    Object {
        /// Datetime template
        datetime: InterpolatedString,
        /// Format of the rendered datetime
        #[serde(default)]
        datetime_format: Option<String>,
    },
    /// `"{{ config.start_date }}"`
    Template(InterpolatedString),
}

impl DatetimeBound {
    /// The datetime template
    pub fn template(&self) -> &InterpolatedString {
        match self {
            Self::Template(t) | Self::Object { datetime: t, .. } => t,
        }
    }

    /// Format declared next to the datetime
    pub fn format(&self) -> Option<&str> {
        match self {
            Self::Object {
                datetime_format, ..
            } => datetime_format.as_deref(),
            Self::Template(_) => None,
        }
    }
}
