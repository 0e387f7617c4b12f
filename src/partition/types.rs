//! Partition types and traits
//!
//! Defines the stream slice and the handle used to read parent streams.

use crate::error::Result;
use crate::types::{JsonObject, JsonValue, SyncMode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a slice, used to associate progress with partitions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Key for a partition mapping
    pub fn from_object(object: &JsonObject) -> Self {
        // serde_json maps are ordered, so equal mappings serialize identically
        Self(serde_json::to_string(object).unwrap_or_default())
    }

    /// Key text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of work: partition values plus an optional cursor window
///
/// `extra_fields` travel with the slice (for templates and diagnostics)
/// but are not part of its identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSlice {
    /// Partition values (e.g. parent id, account)
    #[serde(default)]
    pub partition: JsonObject,
    /// Cursor window bounds
    #[serde(default)]
    pub cursor_slice: JsonObject,
    /// Non-identifying values
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub extra_fields: JsonObject,
}

impl StreamSlice {
    /// Create a slice from partition values and a cursor window
    pub fn new(partition: JsonObject, cursor_slice: JsonObject) -> Self {
        Self {
            partition,
            cursor_slice,
            extra_fields: JsonObject::new(),
        }
    }

    /// The single empty slice of an unpartitioned stream
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a partition value
    #[must_use]
    pub fn with_partition_value(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.partition.insert(key.into(), value.into());
        self
    }

    /// Replace the cursor window
    #[must_use]
    pub fn with_cursor_slice(mut self, cursor_slice: JsonObject) -> Self {
        self.cursor_slice = cursor_slice;
        self
    }

    /// Add an extra field
    #[must_use]
    pub fn with_extra_field(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra_fields.insert(key.into(), value.into());
        self
    }

    /// Look up a key in the partition, then the cursor window
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.partition
            .get(key)
            .or_else(|| self.cursor_slice.get(key))
    }

    /// Identity of the whole slice (partition and window)
    pub fn key(&self) -> PartitionKey {
        let mut identity = self.partition.clone();
        if !self.cursor_slice.is_empty() {
            identity.insert(
                "__cursor_slice".to_string(),
                JsonValue::Object(self.cursor_slice.clone()),
            );
        }
        PartitionKey::from_object(&identity)
    }

    /// Identity of the partition alone, used for per-partition state
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::from_object(&self.partition)
    }

    /// Partition values as JSON
    pub fn partition_value(&self) -> JsonValue {
        JsonValue::Object(self.partition.clone())
    }

    /// Cursor window as JSON
    pub fn cursor_value(&self) -> JsonValue {
        JsonValue::Object(self.cursor_slice.clone())
    }

    /// True for the empty slice of an unpartitioned stream
    pub fn is_empty(&self) -> bool {
        self.partition.is_empty() && self.cursor_slice.is_empty()
    }
}

/// Read-only access to parent stream records for substream partitioning
#[async_trait]
pub trait ParentRecordSource: Send + Sync {
    /// Read every record of a parent stream, in emission order
    async fn read_parent_records(&self, stream: &str, sync_mode: SyncMode) -> Result<Vec<JsonValue>>;
}
