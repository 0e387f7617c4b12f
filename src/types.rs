//! Common types used throughout the declarative engine
//!
//! This module contains shared type definitions, type aliases,
//! datetime helpers, and utility types used across multiple modules.

use crate::error::{Error, Result};
use crate::partition::StreamSlice;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Records
// ============================================================================

/// A single extracted record, tagged with the slice it was read under
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Name of the stream that produced the record
    pub stream: Arc<str>,
    /// Decoded record mapping
    pub data: JsonValue,
    /// Slice the record was read under
    pub slice: Arc<StreamSlice>,
}

impl Record {
    /// Create a new record
    pub fn new(stream: Arc<str>, data: JsonValue, slice: Arc<StreamSlice>) -> Self {
        Self {
            stream,
            data,
            slice,
        }
    }

    /// Look up a top-level field of the record
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.data.get(field)
    }
}

// ============================================================================
// HTTP Types
// ============================================================================

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    #[serde(alias = "get")]
    GET,
    #[serde(alias = "post")]
    POST,
    #[serde(alias = "put")]
    PUT,
    #[serde(alias = "patch")]
    PATCH,
    #[serde(alias = "delete")]
    DELETE,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PUT => reqwest::Method::PUT,
            Method::PATCH => reqwest::Method::PATCH,
            Method::DELETE => reqwest::Method::DELETE,
        }
    }
}

// ============================================================================
// Sync Mode
// ============================================================================

/// Synchronization mode for streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full refresh - fetch all data every time
    #[default]
    FullRefresh,
    /// Incremental - only fetch new/updated data
    Incremental,
}

// ============================================================================
// Log Level
// ============================================================================

/// Log level for connector messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

// ============================================================================
// Datetime Helpers
// ============================================================================

/// Parse a datetime string in any of the commonly used layouts
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let datetime_formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    for fmt in datetime_formats {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(nd) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(ndt) = nd.and_hms_opt(0, 0, 0) {
                return Ok(Utc.from_utc_datetime(&ndt));
            }
        }
    }

    Err(Error::config(format!("Invalid datetime format: {s}")))
}

/// Parse a datetime string with an explicit strftime pattern
///
/// `%s` is accepted as seconds since the epoch.
pub fn parse_datetime_with(s: &str, pattern: &str) -> Result<DateTime<Utc>> {
    if pattern == "%s" {
        let secs: i64 = s
            .parse()
            .map_err(|_| Error::config(format!("Invalid epoch timestamp: {s}")))?;
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| Error::config(format!("Epoch timestamp out of range: {s}")));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, pattern) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, pattern) {
        return Ok(Utc.from_utc_datetime(&ndt));
    }
    if let Ok(nd) = NaiveDate::parse_from_str(s, pattern) {
        if let Some(ndt) = nd.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }
    Err(Error::config(format!(
        "Datetime '{s}' does not match format '{pattern}'"
    )))
}

/// Format a datetime with a strftime pattern (`%s` renders epoch seconds)
pub fn format_with_pattern(dt: DateTime<Utc>, pattern: &str) -> String {
    if pattern == "%s" {
        dt.timestamp().to_string()
    } else {
        dt.format(pattern).to_string()
    }
}

/// Parse a duration like "P1D", "PT6H", "P2W" or the short forms "1d", "2h", "30m"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || Error::config(format!("Invalid duration: {s}"));

    if let Some(rest) = s.strip_prefix('P') {
        let (date_part, time_part) = match rest.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (rest, None),
        };
        let mut total = Duration::zero();
        let mut saw_component = false;
        for (part, is_time) in [(date_part, false), (time_part.unwrap_or(""), true)] {
            let mut num = String::new();
            for c in part.chars() {
                if c.is_ascii_digit() {
                    num.push(c);
                    continue;
                }
                let n: i64 = num.parse().map_err(|_| invalid())?;
                num.clear();
                let component = match (c, is_time) {
                    ('Y', false) => n.checked_mul(365).and_then(Duration::try_days),
                    ('M', false) => n.checked_mul(30).and_then(Duration::try_days),
                    ('W', false) => Duration::try_weeks(n),
                    ('D', false) => Duration::try_days(n),
                    ('H', true) => Duration::try_hours(n),
                    ('M', true) => Duration::try_minutes(n),
                    ('S', true) => Duration::try_seconds(n),
                    _ => return Err(invalid()),
                };
                total = component
                    .and_then(|component| total.checked_add(&component))
                    .ok_or_else(invalid)?;
                saw_component = true;
            }
            if !num.is_empty() {
                return Err(invalid());
            }
        }
        return if saw_component { Ok(total) } else { Err(invalid()) };
    }

    let (num_str, suffix) = match s.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&s[..idx], c),
        _ => (s, 'd'),
    };
    let num: i64 = num_str.parse().map_err(|_| invalid())?;
    let duration = match suffix {
        'w' => Duration::try_weeks(num),
        'd' => Duration::try_days(num),
        'h' => Duration::try_hours(num),
        'm' => Duration::try_minutes(num),
        's' => Duration::try_seconds(num),
        _ => return Err(invalid()),
    };
    duration.ok_or_else(invalid)
}

// ============================================================================
// Utilities
// ============================================================================

/// Convert a JSON value to the string used in URLs, headers and templates
pub fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
