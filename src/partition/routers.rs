//! Partition router implementations
//!
//! Each router handles a specific partitioning strategy. The stream slicer
//! combines the router with optional datetime windows.

use super::types::{ParentRecordSource, StreamSlice};
use crate::error::{Error, Result};
use crate::http::{RequestOption, RequestOptions};
use crate::state::StreamState;
use crate::template::{InterpolatedString, TemplateContext};
use crate::types::{
    format_with_pattern, parse_datetime, parse_datetime_with, parse_duration, value_to_string,
    JsonObject, JsonValue, SyncMode,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Default datetime format of window bounds
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ============================================================================
// Partition Router
// ============================================================================

/// Decomposes a stream into independent partitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionRouter {
    /// One empty partition
    #[default]
    #[serde(alias = "SinglePartitionRouter")]
    Single,
    /// One partition per listed value
    #[serde(alias = "ListPartitionRouter")]
    List(ListRouter),
    /// One partition per parent record
    #[serde(alias = "SubstreamPartitionRouter")]
    Substream(SubstreamRouter),
}

impl PartitionRouter {
    /// Produce partitions in router order
    pub async fn partitions(
        &self,
        sync_mode: SyncMode,
        config: &JsonValue,
        parents: &dyn ParentRecordSource,
    ) -> Result<Vec<StreamSlice>> {
        match self {
            PartitionRouter::Single => Ok(vec![StreamSlice::empty()]),
            PartitionRouter::List(router) => router.partitions(config),
            PartitionRouter::Substream(router) => router.partitions(sync_mode, parents).await,
        }
    }

    /// Request fragments carrying the partition values of a slice
    pub fn request_options(&self, slice: &StreamSlice) -> RequestOptions {
        let mut options = RequestOptions::new();
        match self {
            PartitionRouter::Single => {}
            PartitionRouter::List(router) => {
                if let (Some(option), Some(value)) = (
                    router.request_option.as_ref(),
                    slice.partition.get(&router.cursor_field),
                ) {
                    options.inject(option, value);
                }
            }
            PartitionRouter::Substream(router) => {
                for parent in &router.parent_stream_configs {
                    if let (Some(option), Some(value)) = (
                        parent.request_option.as_ref(),
                        slice.partition.get(&parent.partition_field),
                    ) {
                        options.inject(option, value);
                    }
                }
            }
        }
        options
    }

    /// Names of parent streams this router reads
    pub fn parent_streams(&self) -> Vec<&str> {
        match self {
            PartitionRouter::Substream(router) => router
                .parent_stream_configs
                .iter()
                .map(|p| p.stream.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// True when partitions carry their own cursor state
    pub fn is_partitioned(&self) -> bool {
        !matches!(self, PartitionRouter::Single)
    }
}

// ============================================================================
// List Router
// ============================================================================

/// Static values, or a template evaluating to a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListValues {
    /// Literal values
    Static(Vec<JsonValue>),
    /// Template such as `"{{ config.accounts }}"`
    Template(InterpolatedString),
}

/// List-based partition router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRouter {
    /// Partition values
    pub values: ListValues,
    /// Partition key holding the value
    pub cursor_field: String,
    /// Where to inject the value on requests
    #[serde(default)]
    pub request_option: Option<RequestOption>,
}

impl ListRouter {
    /// Create a list router over static values
    pub fn new(values: Vec<JsonValue>, cursor_field: impl Into<String>) -> Self {
        Self {
            values: ListValues::Static(values),
            cursor_field: cursor_field.into(),
            request_option: None,
        }
    }

    /// Inject the value on requests
    #[must_use]
    pub fn with_request_option(mut self, option: RequestOption) -> Self {
        self.request_option = Some(option);
        self
    }

    fn values(&self, config: &JsonValue) -> Result<Vec<JsonValue>> {
        match self.values {
            ListValues::Static(ref values) => Ok(values.clone()),
            ListValues::Template(ref template) => {
                let ctx = TemplateContext::with_config(config.clone());
                match template.eval(&ctx)? {
                    JsonValue::Array(values) => Ok(values),
                    JsonValue::String(s) => match serde_json::from_str::<JsonValue>(&s) {
                        Ok(JsonValue::Array(values)) => Ok(values),
                        _ => Ok(s
                            .split(',')
                            .map(str::trim)
                            .filter(|v| !v.is_empty())
                            .map(|v| JsonValue::String(v.to_string()))
                            .collect()),
                    },
                    JsonValue::Null => Ok(Vec::new()),
                    other => Err(Error::config(format!(
                        "List partition values must evaluate to a list, got {other}"
                    ))),
                }
            }
        }
    }

    fn partitions(&self, config: &JsonValue) -> Result<Vec<StreamSlice>> {
        Ok(self
            .values(config)?
            .into_iter()
            .map(|value| StreamSlice::empty().with_partition_value(self.cursor_field.clone(), value))
            .collect())
    }
}

// ============================================================================
// Substream Router
// ============================================================================

/// How one parent stream feeds the partitions of a child stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentStreamConfig {
    /// Parent stream name
    pub stream: String,
    /// Parent record field (dotted path) holding the partition value
    pub parent_key: String,
    /// Partition key of the child slice
    pub partition_field: String,
    /// Where to inject the value on requests
    #[serde(default)]
    pub request_option: Option<RequestOption>,
    /// Read the parent with the child's sync mode instead of a full refresh
    #[serde(default)]
    pub incremental_dependency: bool,
}

impl ParentStreamConfig {
    /// Parent link `stream.parent_key -> partition_field`
    pub fn new(
        stream: impl Into<String>,
        parent_key: impl Into<String>,
        partition_field: impl Into<String>,
    ) -> Self {
        Self {
            stream: stream.into(),
            parent_key: parent_key.into(),
            partition_field: partition_field.into(),
            request_option: None,
            incremental_dependency: false,
        }
    }

    /// Extract the partition value from a parent record
    fn extract_key<'a>(&self, record: &'a JsonValue) -> Option<&'a JsonValue> {
        let mut current = record;
        for part in self.parent_key.split('.') {
            current = current.get(part)?;
        }
        (!current.is_null()).then_some(current)
    }
}

/// Parent stream-based partition router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstreamRouter {
    /// Parent links, read in order
    pub parent_stream_configs: Vec<ParentStreamConfig>,
}

impl SubstreamRouter {
    /// Create a router over a single parent
    pub fn new(parent: ParentStreamConfig) -> Self {
        Self {
            parent_stream_configs: vec![parent],
        }
    }

    async fn partitions(
        &self,
        sync_mode: SyncMode,
        parents: &dyn ParentRecordSource,
    ) -> Result<Vec<StreamSlice>> {
        let mut partitions = Vec::new();

        for parent in &self.parent_stream_configs {
            let mode = if parent.incremental_dependency {
                sync_mode
            } else {
                SyncMode::FullRefresh
            };
            let records = parents.read_parent_records(&parent.stream, mode).await?;
            let mut seen = HashSet::new();

            for record in records {
                let Some(value) = parent.extract_key(&record) else {
                    debug!(parent = %parent.stream, key = %parent.parent_key, "Parent record without key");
                    continue;
                };
                // Deduplicate
                if !seen.insert(value.to_string()) {
                    continue;
                }
                let value = value.clone();
                partitions.push(
                    StreamSlice::empty()
                        .with_partition_value(parent.partition_field.clone(), value)
                        .with_extra_field("parent_record", record),
                );
            }
        }

        Ok(partitions)
    }
}

// ============================================================================
// Datetime Windows
// ============================================================================

/// Contiguous datetime windows of an incremental stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatetimeWindows {
    /// Earliest datetime to read
    pub start_datetime: InterpolatedString,
    /// Latest datetime to read; now when absent
    #[serde(default)]
    pub end_datetime: Option<InterpolatedString>,
    /// Window length (`P1D`, `7d`); one window when absent
    #[serde(default)]
    pub step: Option<String>,
    /// Gap between a window end and the next window start
    #[serde(default)]
    pub cursor_granularity: Option<String>,
    /// Re-read this far behind the stored cursor
    #[serde(default)]
    pub lookback_window: Option<String>,
    /// Format of window bounds
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,
    /// Slice key of the window start
    #[serde(default = "default_start_key")]
    pub start_key: String,
    /// Slice key of the window end
    #[serde(default = "default_end_key")]
    pub end_key: String,
    /// Where to inject the window start
    #[serde(default)]
    pub start_time_option: Option<RequestOption>,
    /// Where to inject the window end
    #[serde(default)]
    pub end_time_option: Option<RequestOption>,
}

fn default_datetime_format() -> String {
    DEFAULT_DATETIME_FORMAT.to_string()
}

fn default_start_key() -> String {
    crate::state::DEFAULT_START_KEY.to_string()
}

fn default_end_key() -> String {
    "end_time".to_string()
}

impl DatetimeWindows {
    /// Windows from `start_datetime` to now
    pub fn new(start_datetime: InterpolatedString) -> Self {
        Self {
            start_datetime,
            end_datetime: None,
            step: None,
            cursor_granularity: None,
            lookback_window: None,
            datetime_format: default_datetime_format(),
            start_key: default_start_key(),
            end_key: default_end_key(),
            start_time_option: None,
            end_time_option: None,
        }
    }

    /// Set the end datetime
    #[must_use]
    pub fn with_end(mut self, end_datetime: InterpolatedString) -> Self {
        self.end_datetime = Some(end_datetime);
        self
    }

    /// Set the window length
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Set the cursor granularity
    #[must_use]
    pub fn with_granularity(mut self, granularity: impl Into<String>) -> Self {
        self.cursor_granularity = Some(granularity.into());
        self
    }

    /// Set the lookback window
    #[must_use]
    pub fn with_lookback(mut self, lookback: impl Into<String>) -> Self {
        self.lookback_window = Some(lookback.into());
        self
    }

    /// Set the format of window bounds
    #[must_use]
    pub fn with_datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = format.into();
        self
    }

    /// Compute the windows
    ///
    /// Incremental reads start at the later of `start_datetime` and the stored
    /// cursor (minus the lookback window).
    pub fn windows(
        &self,
        sync_mode: SyncMode,
        cursor: Option<&JsonValue>,
        config: &JsonValue,
    ) -> Result<Vec<JsonObject>> {
        let ctx = TemplateContext::with_config(config.clone());
        let mut start = self.parse(&self.start_datetime.render(&ctx)?)?;
        let end = match self.end_datetime {
            Some(ref end) => self.parse(&end.render(&ctx)?)?,
            None => Utc::now(),
        };

        if sync_mode == SyncMode::Incremental {
            if let Some(cursor) = cursor.and_then(|c| self.parse_cursor(c)) {
                let lookback = match self.lookback_window {
                    Some(ref lookback) => parse_duration(lookback)?,
                    None => Duration::zero(),
                };
                // a lookback reaching past the earliest representable instant leaves start as is
                if let Some(from) = cursor.checked_sub_signed(lookback) {
                    start = start.max(from);
                }
            }
        }

        let granularity = match self.cursor_granularity {
            Some(ref granularity) => parse_duration(granularity)?,
            None => Duration::zero(),
        };
        let step = match self.step {
            Some(ref step) => {
                let step = parse_duration(step)?;
                if step <= Duration::zero() {
                    return Err(Error::config(format!("Window step must be positive: {step}")));
                }
                Some(step)
            }
            None => None,
        };

        let mut windows = Vec::new();
        let mut current = start;
        while current <= end {
            let Some(step) = step else {
                windows.push(self.window(current, end));
                break;
            };
            let next = current
                .checked_add_signed(step)
                .ok_or_else(|| Error::config(format!("Window step {step} overflows from {current}")))?;
            let window_end = next
                .checked_sub_signed(granularity)
                .ok_or_else(|| Error::config(format!("Cursor granularity {granularity} is out of range")))?
                .min(end);
            windows.push(self.window(current, window_end));
            if granularity == Duration::zero() {
                if next >= end {
                    break;
                }
                current = next;
            } else {
                current = window_end.checked_add_signed(granularity).ok_or_else(|| {
                    Error::config(format!("Cursor granularity {granularity} is out of range"))
                })?;
            }
        }

        debug!(windows = windows.len(), start = %start, end = %end, "Computed datetime windows");
        Ok(windows)
    }

    /// Request fragments carrying the window bounds of a slice
    pub fn request_options(&self, slice: &StreamSlice) -> RequestOptions {
        let mut options = RequestOptions::new();
        for (option, key) in [
            (&self.start_time_option, &self.start_key),
            (&self.end_time_option, &self.end_key),
        ] {
            if let (Some(option), Some(value)) = (option, slice.cursor_slice.get(key)) {
                options.inject(option, value);
            }
        }
        options
    }

    fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> JsonObject {
        let mut window = JsonObject::new();
        window.insert(
            self.start_key.clone(),
            JsonValue::String(format_with_pattern(start, &self.datetime_format)),
        );
        window.insert(
            self.end_key.clone(),
            JsonValue::String(format_with_pattern(end, &self.datetime_format)),
        );
        window
    }

    fn parse(&self, s: &str) -> Result<DateTime<Utc>> {
        parse_datetime_with(s, &self.datetime_format).or_else(|_| parse_datetime(s))
    }

    fn parse_cursor(&self, value: &JsonValue) -> Option<DateTime<Utc>> {
        match value {
            JsonValue::Number(n) => n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            other => self.parse(&value_to_string(other)).ok(),
        }
    }
}

// ============================================================================
// Stream Slicer
// ============================================================================

/// Partition router combined with optional datetime windows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSlicer {
    /// Partition router
    pub router: PartitionRouter,
    /// Datetime windows of an incremental stream
    pub windows: Option<DatetimeWindows>,
    /// Cursor field used to find where windows resume
    pub cursor_field: Option<String>,
}

impl StreamSlicer {
    /// Slicer over a router without windows
    pub fn new(router: PartitionRouter) -> Self {
        Self {
            router,
            windows: None,
            cursor_field: None,
        }
    }

    /// Add datetime windows resuming from `cursor_field`
    #[must_use]
    pub fn with_windows(mut self, windows: DatetimeWindows, cursor_field: impl Into<String>) -> Self {
        self.windows = Some(windows);
        self.cursor_field = Some(cursor_field.into());
        self
    }

    /// Produce every slice: each partition crossed with its windows
    pub async fn partitions(
        &self,
        sync_mode: SyncMode,
        stream_state: &StreamState,
        config: &JsonValue,
        parents: &dyn ParentRecordSource,
    ) -> Result<Vec<StreamSlice>> {
        let partitions = self.router.partitions(sync_mode, config, parents).await?;
        let Some(ref windows) = self.windows else {
            return Ok(partitions);
        };

        let mut slices = Vec::new();
        for partition in partitions {
            let cursor = self
                .cursor_field
                .as_deref()
                .and_then(|field| stream_state.partition_cursor_value(&partition.partition, field));
            for window in windows.windows(sync_mode, cursor, config)? {
                slices.push(partition.clone().with_cursor_slice(window));
            }
        }
        Ok(slices)
    }

    /// Request fragments for a slice
    pub fn request_options(&self, slice: &StreamSlice) -> RequestOptions {
        let mut options = self.router.request_options(slice);
        if let Some(ref windows) = self.windows {
            options.merge(windows.request_options(slice));
        }
        options
    }
}
