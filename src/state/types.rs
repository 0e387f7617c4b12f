//! State types for tracking sync progress
//!
//! These types are serialized to JSON and persisted between runs. The
//! persisted payload is a mapping from stream name to that stream's cursor
//! mapping, optionally carrying per-partition cursors under `states`.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Complete state for a source: `{ "<stream>": <stream state> }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    /// Per-stream state
    pub streams: BTreeMap<String, StreamState>,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse state from JSON
    ///
    /// Accepts the plain stream mapping as well as a list of protocol state
    /// messages (`[{"type": "STREAM", "stream": {"stream_descriptor": ..., "stream_state": ...}}]`),
    /// optionally wrapped in their `{"type": "STATE", "state": ...}` envelope.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)
            .map_err(|e| Error::state(format!("Failed to parse state JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Load state from a file; a missing file yields empty state
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::state(format!("Failed to read state file: {e}")))?;
        if contents.trim().is_empty() {
            return Ok(Self::new());
        }
        Self::from_json(&contents)
    }

    /// Build state from a JSON value
    pub fn from_value(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Array(messages) => {
                let mut state = Self::new();
                for message in messages {
                    let inner = message.get("state").unwrap_or(&message);
                    let stream = inner.get("stream").unwrap_or(inner);
                    let name = stream
                        .pointer("/stream_descriptor/name")
                        .and_then(JsonValue::as_str)
                        .ok_or_else(|| Error::state("State message without stream_descriptor.name"))?;
                    let stream_state = stream
                        .get("stream_state")
                        .cloned()
                        .unwrap_or(JsonValue::Null);
                    state
                        .streams
                        .insert(name.to_string(), StreamState::from_value(stream_state)?);
                }
                Ok(state)
            }
            value => serde_json::from_value(value)
                .map_err(|e| Error::state(format!("Failed to parse state: {e}"))),
        }
    }

    /// Get state for a stream
    pub fn get_stream(&self, stream: &str) -> Option<&StreamState> {
        self.streams.get(stream)
    }

    /// Replace the state of a stream
    pub fn set_stream(&mut self, stream: impl Into<String>, state: StreamState) {
        self.streams.insert(stream.into(), state);
    }

    /// Serialize as pretty JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }
}

/// State for a single stream
///
/// The global cursor lives at the top level (`{"updated_at": "..."}`);
/// partitioned streams additionally keep one cursor per partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    /// Per-partition cursors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<PartitionState>,

    /// Global cursor mapping
    #[serde(flatten)]
    pub cursor: JsonObject,
}

impl StreamState {
    /// Create a new empty stream state
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value; `null` is empty state
    pub fn from_value(value: JsonValue) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::new());
        }
        serde_json::from_value(value)
            .map_err(|e| Error::state(format!("Stream state must be a mapping: {e}")))
    }

    /// State as a JSON value (for templates and migrations)
    pub fn to_value(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.cursor.is_empty() && self.states.is_empty()
    }

    /// Global cursor value of a field
    pub fn cursor_value(&self, field: &str) -> Option<&JsonValue> {
        self.cursor.get(field).filter(|v| !v.is_null())
    }

    /// Set the global cursor value of a field
    pub fn set_cursor_value(&mut self, field: impl Into<String>, value: JsonValue) {
        self.cursor.insert(field.into(), value);
    }

    /// State entry of a partition
    pub fn get_partition(&self, partition: &JsonObject) -> Option<&PartitionState> {
        self.states.iter().find(|s| &s.partition == partition)
    }

    /// Cursor value of a partition, falling back to the global cursor
    pub fn partition_cursor_value(&self, partition: &JsonObject, field: &str) -> Option<&JsonValue> {
        self.get_partition(partition)
            .and_then(|s| s.cursor.get(field))
            .filter(|v| !v.is_null())
            .or_else(|| self.cursor_value(field))
    }

    /// Set the cursor value of a partition, creating its entry if needed
    pub fn set_partition_cursor_value(
        &mut self,
        partition: &JsonObject,
        field: impl Into<String>,
        value: JsonValue,
    ) {
        match self.states.iter_mut().find(|s| &s.partition == partition) {
            Some(entry) => {
                entry.cursor.insert(field.into(), value);
            }
            None => {
                let mut cursor = JsonObject::new();
                cursor.insert(field.into(), value);
                self.states.push(PartitionState {
                    partition: partition.clone(),
                    cursor,
                });
            }
        }
    }
}

/// Cursor of a single partition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionState {
    /// Partition values identifying the entry
    pub partition: JsonObject,
    /// Cursor mapping of the partition
    #[serde(default)]
    pub cursor: JsonObject,
}
