//! Tests for partition module

use super::*;
use crate::error::{Error, Result};
use crate::http::{InjectInto, RequestOption};
use crate::state::StreamState;
use crate::template::InterpolatedString;
use crate::types::{JsonValue, SyncMode};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

/// Parent streams served from memory, recording every read
#[derive(Default)]
struct StaticParents {
    records: HashMap<String, Vec<JsonValue>>,
    reads: Mutex<Vec<(String, SyncMode)>>,
}

impl StaticParents {
    fn with(stream: &str, records: Vec<JsonValue>) -> Self {
        let mut parents = Self::default();
        parents.records.insert(stream.to_string(), records);
        parents
    }

    fn reads(&self) -> Vec<(String, SyncMode)> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ParentRecordSource for StaticParents {
    async fn read_parent_records(&self, stream: &str, sync_mode: SyncMode) -> Result<Vec<JsonValue>> {
        self.reads
            .lock()
            .unwrap()
            .push((stream.to_string(), sync_mode));
        self.records
            .get(stream)
            .cloned()
            .ok_or_else(|| Error::StreamNotFound {
                stream: stream.to_string(),
            })
    }
}

fn partition_values(slices: &[StreamSlice], key: &str) -> Vec<JsonValue> {
    slices
        .iter()
        .map(|s| s.partition.get(key).cloned().unwrap_or(JsonValue::Null))
        .collect()
}

fn template(s: &str) -> InterpolatedString {
    InterpolatedString::new(s).unwrap()
}

// ============================================================================
// StreamSlice Tests
// ============================================================================

#[test]
fn test_slice_identity() {
    let a = StreamSlice::empty().with_partition_value("id", 1);
    let b = StreamSlice::empty()
        .with_partition_value("id", 1)
        .with_extra_field("parent_record", json!({"id": 1, "name": "x"}));
    assert_eq!(a.key(), b.key());
    assert_eq!(a.key().as_str(), r#"{"id":1}"#);

    let windowed = a
        .clone()
        .with_cursor_slice(json!({"start_time": "2024-01-01"}).as_object().cloned().unwrap());
    assert_ne!(a.key(), windowed.key());
    assert_eq!(a.partition_key(), windowed.partition_key());
    assert_eq!(windowed.get("start_time"), Some(&json!("2024-01-01")));
    assert!(StreamSlice::empty().is_empty());
}

// ============================================================================
// Router Tests
// ============================================================================

#[tokio::test]
async fn test_single_partition() {
    let parents = StaticParents::default();
    let slices = PartitionRouter::Single
        .partitions(SyncMode::FullRefresh, &json!({}), &parents)
        .await
        .unwrap();
    assert_eq!(slices, vec![StreamSlice::empty()]);
}

#[tokio::test]
async fn test_list_router_static_values() {
    let parents = StaticParents::default();
    let router = PartitionRouter::List(ListRouter::new(
        vec![json!("us"), json!("eu")],
        "region",
    ));
    let slices = router
        .partitions(SyncMode::FullRefresh, &json!({}), &parents)
        .await
        .unwrap();
    assert_eq!(partition_values(&slices, "region"), vec![json!("us"), json!("eu")]);
}

#[tokio::test]
async fn test_list_router_values_from_config() {
    let parents = StaticParents::default();
    let router: PartitionRouter = serde_yaml::from_str(
        r#"
type: ListPartitionRouter
values: "{{ config.accounts }}"
cursor_field: account_id
request_option:
  inject_into: header
  field_name: X-Account
"#,
    )
    .unwrap();

    let slices = router
        .partitions(SyncMode::FullRefresh, &json!({"accounts": [10, 20]}), &parents)
        .await
        .unwrap();
    assert_eq!(partition_values(&slices, "account_id"), vec![json!(10), json!(20)]);

    let options = router.request_options(&slices[1]);
    assert_eq!(options.headers.get("X-Account").map(String::as_str), Some("20"));

    let slices = router
        .partitions(SyncMode::FullRefresh, &json!({"accounts": "a, b"}), &parents)
        .await
        .unwrap();
    assert_eq!(partition_values(&slices, "account_id"), vec![json!("a"), json!("b")]);
}

#[tokio::test]
async fn test_substream_follows_parent_order_and_dedupes() {
    let parents = StaticParents::with(
        "projects",
        vec![
            json!({"id": 3, "name": "c"}),
            json!({"id": 1, "name": "a"}),
            json!({"id": 3, "name": "c again"}),
            json!({"name": "no id"}),
            json!({"id": 2, "name": "b"}),
        ],
    );
    let router = PartitionRouter::Substream(SubstreamRouter::new(ParentStreamConfig::new(
        "projects",
        "id",
        "project_id",
    )));

    let slices = router
        .partitions(SyncMode::Incremental, &json!({}), &parents)
        .await
        .unwrap();
    assert_eq!(
        partition_values(&slices, "project_id"),
        vec![json!(3), json!(1), json!(2)]
    );
    assert_eq!(
        slices[0].extra_fields.get("parent_record"),
        Some(&json!({"id": 3, "name": "c"}))
    );
    // parents are read in full unless declared as an incremental dependency
    assert_eq!(
        parents.reads(),
        vec![("projects".to_string(), SyncMode::FullRefresh)]
    );
    assert_eq!(router.parent_streams(), vec!["projects"]);
}

#[tokio::test]
async fn test_substream_nested_key_and_request_option() {
    let parents = StaticParents::with(
        "repos",
        vec![json!({"owner": {"login": "octo"}}), json!({"owner": {}})],
    );
    let mut parent = ParentStreamConfig::new("repos", "owner.login", "owner");
    parent.request_option = Some(RequestOption::new(InjectInto::RequestParameter, "owner"));
    parent.incremental_dependency = true;
    let router = PartitionRouter::Substream(SubstreamRouter::new(parent));

    let slices = router
        .partitions(SyncMode::Incremental, &json!({}), &parents)
        .await
        .unwrap();
    assert_eq!(partition_values(&slices, "owner"), vec![json!("octo")]);
    assert_eq!(
        router.request_options(&slices[0]).params.get("owner").map(String::as_str),
        Some("octo")
    );
    assert_eq!(parents.reads()[0].1, SyncMode::Incremental);
}

#[tokio::test]
async fn test_substream_unknown_parent_fails() {
    let parents = StaticParents::default();
    let router = PartitionRouter::Substream(SubstreamRouter::new(ParentStreamConfig::new(
        "missing", "id", "id",
    )));
    let result = router
        .partitions(SyncMode::FullRefresh, &json!({}), &parents)
        .await;
    assert!(matches!(result, Err(Error::StreamNotFound { .. })));
}

// ============================================================================
// Datetime Window Tests
// ============================================================================

#[test]
fn test_windows_with_step_and_granularity() {
    let windows = DatetimeWindows::new(template("2024-01-01T00:00:00Z"))
        .with_end(template("2024-01-02T12:00:00Z"))
        .with_step("P1D")
        .with_granularity("PT1S");
    let result = windows
        .windows(SyncMode::FullRefresh, None, &json!({}))
        .unwrap();
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!([
            {"start_time": "2024-01-01T00:00:00Z", "end_time": "2024-01-01T23:59:59Z"},
            {"start_time": "2024-01-02T00:00:00Z", "end_time": "2024-01-02T12:00:00Z"}
        ])
    );
}

#[test]
fn test_windows_without_granularity_are_contiguous() {
    let windows = DatetimeWindows::new(template("{{ config.start_date }}"))
        .with_end(template("2024-01-03"))
        .with_step("1d")
        .with_datetime_format("%Y-%m-%d");
    let result = windows
        .windows(SyncMode::FullRefresh, None, &json!({"start_date": "2024-01-01"}))
        .unwrap();
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!([
            {"start_time": "2024-01-01", "end_time": "2024-01-02"},
            {"start_time": "2024-01-02", "end_time": "2024-01-03"}
        ])
    );
}

#[test]
fn test_windows_resume_from_cursor_with_lookback() {
    let windows = DatetimeWindows::new(template("2024-01-01T00:00:00Z"))
        .with_end(template("2024-01-05T00:00:00Z"))
        .with_lookback("PT12H");
    let cursor = json!("2024-01-02T00:00:00Z");

    let incremental = windows
        .windows(SyncMode::Incremental, Some(&cursor), &json!({}))
        .unwrap();
    assert_eq!(incremental.len(), 1);
    assert_eq!(incremental[0]["start_time"], json!("2024-01-01T12:00:00Z"));

    let full = windows
        .windows(SyncMode::FullRefresh, Some(&cursor), &json!({}))
        .unwrap();
    assert_eq!(full[0]["start_time"], json!("2024-01-01T00:00:00Z"));
}

#[test]
fn test_windows_empty_when_start_after_end() {
    let windows = DatetimeWindows::new(template("2024-02-01T00:00:00Z"))
        .with_end(template("2024-01-01T00:00:00Z"))
        .with_step("P1D");
    assert!(windows
        .windows(SyncMode::FullRefresh, None, &json!({}))
        .unwrap()
        .is_empty());
}

#[test]
fn test_windows_reject_non_positive_step() {
    let windows = DatetimeWindows::new(template("2024-01-01T00:00:00Z"))
        .with_end(template("2024-01-02T00:00:00Z"))
        .with_step("0d");
    assert!(windows.windows(SyncMode::FullRefresh, None, &json!({})).is_err());
}

#[test]
fn test_windows_step_past_representable_time_is_an_error() {
    let windows = DatetimeWindows::new(template("2024-01-01T00:00:00Z"))
        .with_end(template("2024-01-02T00:00:00Z"))
        .with_step("P1000000Y");
    let err = windows
        .windows(SyncMode::FullRefresh, None, &json!({}))
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }), "unexpected error: {err}");
}

#[test]
fn test_windows_lookback_before_earliest_instant_keeps_start() {
    let windows = DatetimeWindows::new(template("2024-01-01T00:00:00Z"))
        .with_end(template("2024-01-03T00:00:00Z"))
        .with_lookback("P100000000Y");
    let cursor = json!("2024-01-02T00:00:00Z");
    let incremental = windows
        .windows(SyncMode::Incremental, Some(&cursor), &json!({}))
        .unwrap();
    assert_eq!(incremental[0]["start_time"], json!("2024-01-01T00:00:00Z"));
}

// ============================================================================
// Stream Slicer Tests
// ============================================================================

#[tokio::test]
async fn test_slicer_crosses_partitions_with_windows() {
    let parents = StaticParents::default();
    let mut windows = DatetimeWindows::new(template("2024-01-01"))
        .with_end(template("2024-01-03"))
        .with_step("P1D")
        .with_datetime_format("%Y-%m-%d");
    windows.start_time_option = Some(RequestOption::new(InjectInto::RequestParameter, "since"));
    let slicer = StreamSlicer::new(PartitionRouter::List(
        ListRouter::new(vec![json!("a"), json!("b")], "account")
            .with_request_option(RequestOption::new(InjectInto::RequestParameter, "account")),
    ))
    .with_windows(windows, "updated_at");

    // account b already read up to the 2nd
    let state = StreamState::from_value(json!({
        "states": [{"partition": {"account": "b"}, "cursor": {"updated_at": "2024-01-02"}}]
    }))
    .unwrap();

    let slices = slicer
        .partitions(SyncMode::Incremental, &state, &json!({}), &parents)
        .await
        .unwrap();
    let summary: Vec<(JsonValue, JsonValue)> = slices
        .iter()
        .map(|s| (s.partition["account"].clone(), s.cursor_slice["start_time"].clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (json!("a"), json!("2024-01-01")),
            (json!("a"), json!("2024-01-02")),
            (json!("b"), json!("2024-01-02")),
        ]
    );

    let options = slicer.request_options(&slices[1]);
    assert_eq!(options.params.get("account").map(String::as_str), Some("a"));
    assert_eq!(options.params.get("since").map(String::as_str), Some("2024-01-02"));
}
