//! Concurrent cursor
//!
//! Tracks per-partition high-water marks and merges them into a stream
//! state that is safe to checkpoint while other partitions are still being
//! read. Only the single consumer of the concurrent reader mutates it.

use super::types::StreamState;
use crate::error::{Error, Result};
use crate::partition::{PartitionKey, StreamSlice};
use crate::types::{parse_datetime, parse_datetime_with, value_to_string, JsonValue, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Default cursor window key holding the window start
pub const DEFAULT_START_KEY: &str = "start_time";

// ============================================================================
// Cursor Definition
// ============================================================================

/// How a stream's cursor is read and compared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorDefinition {
    /// Record field holding the cursor value
    pub cursor_field: String,
    /// Datetime format of cursor values, when they are datetimes
    #[serde(default)]
    pub datetime_format: Option<String>,
    /// Keep one cursor per partition in addition to the global one
    #[serde(default)]
    pub per_partition: bool,
    /// Cursor window key holding the window start
    #[serde(default = "default_start_key")]
    pub start_key: String,
    /// Emit mid-partition checkpoints every N records (single ordered partition only)
    #[serde(default)]
    pub checkpoint_interval: Option<u64>,
}

fn default_start_key() -> String {
    DEFAULT_START_KEY.to_string()
}

impl CursorDefinition {
    /// Cursor over a record field
    pub fn new(cursor_field: impl Into<String>) -> Self {
        Self {
            cursor_field: cursor_field.into(),
            datetime_format: None,
            per_partition: false,
            start_key: default_start_key(),
            checkpoint_interval: None,
        }
    }

    /// Set the datetime format
    #[must_use]
    pub fn with_datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = Some(format.into());
        self
    }

    /// Track per-partition cursors
    #[must_use]
    pub fn with_per_partition(mut self, per_partition: bool) -> Self {
        self.per_partition = per_partition;
        self
    }

    /// Set the window start key
    #[must_use]
    pub fn with_start_key(mut self, key: impl Into<String>) -> Self {
        self.start_key = key.into();
        self
    }

    /// Allow mid-partition checkpoints every `records` records
    #[must_use]
    pub fn with_checkpoint_interval(mut self, records: u64) -> Self {
        self.checkpoint_interval = Some(records);
        self
    }

    /// Compare two cursor values
    ///
    /// Numbers compare numerically, datetimes chronologically, anything else
    /// by its text.
    pub fn compare(&self, a: &JsonValue, b: &JsonValue) -> Ordering {
        if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
            return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
        match (self.as_datetime(a), self.as_datetime(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => value_to_string(a).cmp(&value_to_string(b)),
        }
    }

    fn as_datetime(&self, value: &JsonValue) -> Option<DateTime<Utc>> {
        let JsonValue::String(s) = value else {
            return None;
        };
        self.datetime_format
            .as_deref()
            .and_then(|fmt| parse_datetime_with(s, fmt).ok())
            .or_else(|| parse_datetime(s).ok())
    }

    fn max<'a>(&self, a: &'a JsonValue, b: &'a JsonValue) -> &'a JsonValue {
        if self.compare(b, a) == Ordering::Greater {
            b
        } else {
            a
        }
    }

    fn min<'a>(&self, a: &'a JsonValue, b: &'a JsonValue) -> &'a JsonValue {
        if self.compare(b, a) == Ordering::Less {
            b
        } else {
            a
        }
    }
}

// ============================================================================
// Slice Progress
// ============================================================================

#[derive(Debug)]
struct SliceProgress {
    slice: Arc<StreamSlice>,
    start: Option<JsonValue>,
    high_water: Option<JsonValue>,
    last: Option<JsonValue>,
    ascending: bool,
    records: u64,
}

impl SliceProgress {
    /// Lowest value this slice may still deliver
    fn floor(&self) -> Option<&JsonValue> {
        if self.ascending && self.high_water.is_some() {
            self.high_water.as_ref()
        } else {
            self.start.as_ref()
        }
    }
}

// ============================================================================
// Concurrent Cursor
// ============================================================================

/// Single-writer cursor merging partition progress into a checkpointable state
#[derive(Debug)]
pub struct ConcurrentCursor {
    stream: Arc<str>,
    definition: CursorDefinition,
    state: StreamState,
    open: BTreeMap<PartitionKey, SliceProgress>,
    closed_max: Option<JsonValue>,
    partition_closed_max: HashMap<PartitionKey, JsonValue>,
    records_since_checkpoint: u64,
}

impl ConcurrentCursor {
    /// Create a cursor starting from a previously checkpointed state
    pub fn new(stream: Arc<str>, definition: CursorDefinition, state: StreamState) -> Self {
        Self {
            stream,
            definition,
            state,
            open: BTreeMap::new(),
            closed_max: None,
            partition_closed_max: HashMap::new(),
            records_since_checkpoint: 0,
        }
    }

    /// Cursor field name
    pub fn cursor_field(&self) -> &str {
        &self.definition.cursor_field
    }

    /// Cursor definition
    pub fn definition(&self) -> &CursorDefinition {
        &self.definition
    }

    /// Number of partitions currently in flight
    pub fn open_partitions(&self) -> usize {
        self.open.len()
    }

    /// Register a slice as in flight
    pub fn open_partition(&mut self, slice: Arc<StreamSlice>) {
        let field = &self.definition.cursor_field;
        let start = slice
            .cursor_slice
            .get(&self.definition.start_key)
            .filter(|v| !v.is_null())
            .cloned()
            .or_else(|| {
                self.state
                    .partition_cursor_value(&slice.partition, field)
                    .cloned()
            });
        let key = slice.key();
        debug!(stream = %self.stream, partition = %key, start = ?start, "Opening partition");
        self.open.insert(
            key,
            SliceProgress {
                slice,
                start,
                high_water: None,
                last: None,
                ascending: true,
                records: 0,
            },
        );
    }

    /// Observe a record read under one of the open slices
    ///
    /// The slice's high-water mark never regresses; a lower value is still
    /// emitted but marks the slice as unordered.
    pub fn observe(&mut self, record: &Record) -> Result<()> {
        let key = record.slice.key();
        let definition = &self.definition;
        let progress = self.open.get_mut(&key).ok_or_else(|| {
            Error::state(format!(
                "Record observed for partition {key} of stream {} which is not open",
                self.stream
            ))
        })?;
        progress.records += 1;
        self.records_since_checkpoint += 1;

        let Some(value) = record.get(&definition.cursor_field).filter(|v| !v.is_null()) else {
            return Ok(());
        };

        if let Some(ref last) = progress.last {
            if definition.compare(value, last) == Ordering::Less {
                progress.ascending = false;
            }
        }
        progress.last = Some(value.clone());

        let advance = progress
            .high_water
            .as_ref()
            .map_or(true, |hwm| definition.compare(value, hwm) == Ordering::Greater);
        if advance {
            progress.high_water = Some(value.clone());
        }
        Ok(())
    }

    /// Mark a slice complete and advance the low-water mark
    pub fn close_partition(&mut self, slice: &StreamSlice) -> Result<()> {
        let key = slice.key();
        let progress = self.open.remove(&key).ok_or_else(|| {
            Error::state(format!(
                "Partition {key} of stream {} closed without being open",
                self.stream
            ))
        })?;

        if let Some(ref hwm) = progress.high_water {
            let definition = &self.definition;
            self.closed_max = Some(match self.closed_max.take() {
                Some(current) => definition.max(&current, hwm).clone(),
                None => hwm.clone(),
            });
            if definition.per_partition {
                let partition_key = slice.partition_key();
                let merged = match self.partition_closed_max.get(&partition_key) {
                    Some(current) => definition.max(current, hwm).clone(),
                    None => hwm.clone(),
                };
                self.partition_closed_max.insert(partition_key, merged);
            }
        }

        self.advance_global();
        if self.definition.per_partition {
            self.advance_partition(&progress.slice);
        }
        debug!(
            stream = %self.stream,
            partition = %key,
            records = progress.records,
            checkpoint = ?self.state.cursor_value(&self.definition.cursor_field),
            "Closed partition"
        );
        Ok(())
    }

    /// Current safely advanced state
    pub fn get_checkpoint(&self) -> StreamState {
        self.state.clone()
    }

    /// True when a mid-partition checkpoint is allowed and due
    pub fn should_checkpoint(&self) -> bool {
        let Some(interval) = self.definition.checkpoint_interval else {
            return false;
        };
        interval > 0
            && self.records_since_checkpoint >= interval
            && self.open.len() == 1
            && self.open.values().all(|p| p.ascending)
    }

    /// Advance the state to the progress of a single ordered open partition
    ///
    /// Returns the new checkpoint, or `None` when a mid-partition checkpoint
    /// is not safe or not due.
    pub fn checkpoint_in_flight(&mut self) -> Option<StreamState> {
        if !self.should_checkpoint() {
            return None;
        }
        self.records_since_checkpoint = 0;
        self.advance_global();
        Some(self.get_checkpoint())
    }

    /// Note that a checkpoint has been emitted
    pub fn reset_checkpoint_counter(&mut self) {
        self.records_since_checkpoint = 0;
    }

    fn advance_global(&mut self) {
        let field = self.definition.cursor_field.clone();
        let candidate = self.low_water(self.closed_max.as_ref(), self.open.values());
        if let Some(value) = self.advanced(self.state.cursor_value(&field), candidate) {
            self.state.set_cursor_value(field, value);
        }
    }

    fn advance_partition(&mut self, slice: &StreamSlice) {
        let field = self.definition.cursor_field.clone();
        let partition_key = slice.partition_key();
        let open = self
            .open
            .values()
            .filter(|p| p.slice.partition_key() == partition_key);
        let candidate = self.low_water(self.partition_closed_max.get(&partition_key), open);
        let previous = self
            .state
            .get_partition(&slice.partition)
            .and_then(|s| s.cursor.get(&field));
        if let Some(value) = self.advanced(previous, candidate) {
            self.state
                .set_partition_cursor_value(&slice.partition, field, value);
        }
    }

    /// `min(max closed high-water mark, floors of open slices)`
    fn low_water<'a>(
        &'a self,
        closed_max: Option<&'a JsonValue>,
        open: impl Iterator<Item = &'a SliceProgress>,
    ) -> Option<JsonValue> {
        let definition = &self.definition;
        let mut lowest = closed_max;
        for progress in open {
            let Some(floor) = progress.floor() else {
                // nothing read and nowhere to start from: cannot move past it
                return None;
            };
            lowest = Some(match lowest {
                Some(current) => definition.min(current, floor),
                None => floor,
            });
        }
        lowest.cloned()
    }

    /// The candidate if it moves the cursor forward
    fn advanced(&self, previous: Option<&JsonValue>, candidate: Option<JsonValue>) -> Option<JsonValue> {
        let candidate = candidate?;
        match previous.filter(|v| !v.is_null()) {
            Some(previous) if self.definition.compare(&candidate, previous) != Ordering::Greater => None,
            _ => Some(candidate),
        }
    }
}

