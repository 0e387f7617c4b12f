//! Protocol messages
//!
//! Every message serializes to one JSON document in the Airbyte protocol
//! shape, so a run's stdout can be consumed line by line.

use crate::types::{JsonValue, LogLevel, SyncMode};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// A stream as advertised by discovery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogStream {
    /// Stream name
    pub name: String,
    /// JSON schema of the records
    pub json_schema: JsonValue,
    /// Sync modes the stream supports
    pub supported_sync_modes: Vec<SyncMode>,
    /// True when the manifest declares the cursor
    pub source_defined_cursor: bool,
    /// Cursor field path
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub default_cursor_field: Vec<String>,
    /// Primary key paths
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_defined_primary_key: Vec<Vec<String>>,
}

/// Discovered streams
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Catalog {
    /// Streams in manifest order
    pub streams: Vec<CatalogStream>,
}

/// A message emitted by a run
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// One record
    Record {
        /// Stream name
        stream: Arc<str>,
        /// Record mapping
        data: JsonValue,
        /// Emission time, milliseconds since the epoch
        emitted_at: i64,
    },
    /// Checkpointed stream state
    State {
        /// Stream name
        stream: String,
        /// Stream state mapping
        data: JsonValue,
    },
    /// Log line
    Log {
        /// Level
        level: LogLevel,
        /// Text
        message: String,
    },
    /// Result of a connection check
    ConnectionStatus {
        /// True if the check passed
        succeeded: bool,
        /// Failure reason
        message: Option<String>,
    },
    /// Discovery result
    Catalog(Catalog),
    /// Connector specification
    Spec(JsonValue),
}

impl Message {
    /// Create a record message stamped with the current time
    pub fn record(stream: Arc<str>, data: JsonValue) -> Self {
        Self::Record {
            stream,
            data,
            emitted_at: Utc::now().timestamp_millis(),
        }
    }

    /// Create a state message
    pub fn state(stream: impl Into<String>, data: JsonValue) -> Self {
        Self::State {
            stream: stream.into(),
            data,
        }
    }

    /// Create a log message
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    /// Check if this is a record message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Protocol JSON document
    pub fn to_json(&self) -> JsonValue {
        match self {
            Message::Record {
                stream,
                data,
                emitted_at,
            } => json!({
                "type": "RECORD",
                "record": {"stream": stream.as_ref(), "data": data, "emitted_at": emitted_at}
            }),
            Message::State { stream, data } => json!({
                "type": "STATE",
                "state": {
                    "type": "STREAM",
                    "stream": {
                        "stream_descriptor": {"name": stream},
                        "stream_state": data
                    }
                }
            }),
            Message::Log { level, message } => json!({
                "type": "LOG",
                "log": {"level": level, "message": message}
            }),
            Message::ConnectionStatus { succeeded, message } => {
                let mut status = json!({
                    "status": if *succeeded { "SUCCEEDED" } else { "FAILED" }
                });
                if let Some(message) = message {
                    status["message"] = json!(message);
                }
                json!({"type": "CONNECTION_STATUS", "connectionStatus": status})
            }
            Message::Catalog(catalog) => json!({"type": "CATALOG", "catalog": catalog}),
            Message::Spec(spec) => json!({"type": "SPEC", "spec": spec}),
        }
    }
}
