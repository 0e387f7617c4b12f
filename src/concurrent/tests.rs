//! Tests for concurrent module

use super::*;
use crate::error::{Error, Result};
use crate::output::CollectingSink;
use crate::partition::StreamSlice;
use crate::state::{ConcurrentCursor, CursorDefinition, InMemoryCheckpointSink, StreamState};
use crate::types::Record;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum Script {
    Records(Vec<Value>),
    FailAfter(Vec<Value>, u16),
    WaitForCancel,
    Panic,
}

#[derive(Debug, Default)]
struct ScriptedSource {
    scripts: HashMap<String, Script>,
    started: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn new(scripts: Vec<(&str, Script)>) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts
                .into_iter()
                .map(|(id, script)| (id.to_string(), script))
                .collect(),
            started: Mutex::new(Vec::new()),
        })
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl PartitionSource for ScriptedSource {
    async fn read_partition(
        &self,
        slice: Arc<StreamSlice>,
        records: RecordSender,
        cancel: CancellationToken,
    ) -> Result<()> {
        let id = slice
            .partition
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.started.lock().unwrap().push(id.clone());
        let stream: Arc<str> = Arc::from("items");

        match self.scripts.get(&id).cloned().unwrap_or(Script::Records(vec![])) {
            Script::Records(data) => {
                for d in data {
                    records
                        .send(Record::new(Arc::clone(&stream), d, Arc::clone(&slice)))
                        .await?;
                }
                Ok(())
            }
            Script::FailAfter(data, status) => {
                for d in data {
                    records
                        .send(Record::new(Arc::clone(&stream), d, Arc::clone(&slice)))
                        .await?;
                }
                Err(Error::MaxRetriesExceeded {
                    stream: "items".to_string(),
                    partition: slice.key().to_string(),
                    attempts: 3,
                    last_status: Some(status),
                })
            }
            Script::WaitForCancel => {
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
            Script::Panic => panic!("scripted panic"),
        }
    }
}

fn slices(ids: &[&str]) -> Vec<Arc<StreamSlice>> {
    ids.iter()
        .map(|id| Arc::new(StreamSlice::empty().with_partition_value("id", *id)))
        .collect()
}

fn ids(records: &[Value]) -> Vec<i64> {
    records.iter().filter_map(|r| r["n"].as_i64()).collect()
}

// ============================================================================
// Ordering / Configuration
// ============================================================================

#[test]
fn test_concurrency_is_clamped() {
    assert_eq!(ConcurrentReader::new(0).concurrency(), 1);
    assert_eq!(ConcurrentReader::new(8).concurrency(), 8);
    assert_eq!(ConcurrentReader::new(1000).concurrency(), MAX_CONCURRENCY);
    assert_eq!(ConcurrentReader::default().concurrency(), DEFAULT_CONCURRENCY);
}

#[tokio::test]
async fn test_single_worker_reads_in_router_order() {
    let source = ScriptedSource::new(vec![
        ("a", Script::Records(vec![json!({"n": 1}), json!({"n": 2})])),
        ("b", Script::Records(vec![json!({"n": 3})])),
        ("c", Script::Records(vec![json!({"n": 4}), json!({"n": 5})])),
    ]);
    let messages = CollectingSink::new();
    let checkpoints = InMemoryCheckpointSink::new();

    let report = ConcurrentReader::new(1)
        .read_stream(
            Arc::from("items"),
            slices(&["a", "b", "c"]),
            source.clone(),
            None,
            &messages,
            &checkpoints,
        )
        .await
        .unwrap();

    assert_eq!(source.started(), vec!["a", "b", "c"]);
    assert_eq!(ids(&messages.records("items")), vec![1, 2, 3, 4, 5]);
    assert_eq!(report.status, SyncStatus::Succeeded);
    assert_eq!(report.records, 5);
    assert_eq!(report.partitions_completed, 3);
    assert!(messages.states("items").is_empty());
}

#[tokio::test]
async fn test_parallel_workers_keep_intra_partition_order() {
    let a: Vec<_> = (0..50).map(|n| json!({"n": n})).collect();
    let b: Vec<_> = (100..150).map(|n| json!({"n": n})).collect();
    let source = ScriptedSource::new(vec![("a", Script::Records(a)), ("b", Script::Records(b))]);
    let messages = CollectingSink::new();

    let report = ConcurrentReader::new(2)
        .with_queue_capacity(4)
        .read_stream(
            Arc::from("items"),
            slices(&["a", "b"]),
            source,
            None,
            &messages,
            &InMemoryCheckpointSink::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.records, 100);
    let all = ids(&messages.records("items"));
    let from_a: Vec<_> = all.iter().copied().filter(|n| *n < 100).collect();
    let from_b: Vec<_> = all.iter().copied().filter(|n| *n >= 100).collect();
    assert_eq!(from_a, (0..50).collect::<Vec<_>>());
    assert_eq!(from_b, (100..150).collect::<Vec<_>>());
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[tokio::test]
async fn test_failed_partition_is_isolated_and_blocks_state() {
    let source = ScriptedSource::new(vec![
        ("a", Script::Records(vec![json!({"n": 1, "updated": 1}), json!({"n": 2, "updated": 2})])),
        ("b", Script::FailAfter(vec![], 500)),
        ("c", Script::Records(vec![json!({"n": 4, "updated": 4}), json!({"n": 5, "updated": 5})])),
    ]);
    let messages = CollectingSink::new();
    let checkpoints = InMemoryCheckpointSink::new();
    let mut initial = StreamState::new();
    initial.set_cursor_value("updated", json!(0));
    let mut cursor = ConcurrentCursor::new(
        Arc::from("items"),
        CursorDefinition::new("updated"),
        initial.clone(),
    );

    let report = ConcurrentReader::new(4)
        .read_stream(
            Arc::from("items"),
            slices(&["a", "b", "c"]),
            source,
            Some(&mut cursor),
            &messages,
            &checkpoints,
        )
        .await
        .unwrap();

    let mut emitted = ids(&messages.records("items"));
    emitted.sort_unstable();
    assert_eq!(emitted, vec![1, 2, 4, 5]);

    assert_eq!(report.status, SyncStatus::Failed);
    assert_eq!(report.partitions_completed, 2);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.stream, "items");
    assert_eq!(failure.partition, r#"{"id":"b"}"#);
    assert_eq!(failure.last_status, Some(500));
    assert_eq!(failure.attempts, 3);
    assert!(failure.to_string().contains("last status 500"));

    // b never closed, so nothing moves past its starting value
    assert_eq!(cursor.get_checkpoint(), initial);
    assert_eq!(cursor.open_partitions(), 1);
    assert!(checkpoints.history().is_empty());
    assert!(messages.states("items").is_empty());
}

#[tokio::test]
async fn test_cancel_siblings_policy() {
    let source = ScriptedSource::new(vec![
        ("a", Script::WaitForCancel),
        ("b", Script::FailAfter(vec![json!({"n": 1})], 401)),
        ("c", Script::WaitForCancel),
    ]);
    let messages = CollectingSink::new();

    let report = ConcurrentReader::new(3)
        .with_failure_policy(FailurePolicy::CancelSiblings)
        .read_stream(
            Arc::from("items"),
            slices(&["a", "b", "c"]),
            source,
            None,
            &messages,
            &InMemoryCheckpointSink::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, SyncStatus::Failed);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.partitions_cancelled, 2);
    assert_eq!(report.partitions_completed, 0);
    assert_eq!(ids(&messages.records("items")), vec![1]);
}

#[tokio::test]
async fn test_panicking_partition_is_reported() {
    let source = ScriptedSource::new(vec![
        ("a", Script::Panic),
        ("b", Script::Records(vec![json!({"n": 1})])),
    ]);
    let report = ConcurrentReader::new(2)
        .read_stream(
            Arc::from("items"),
            slices(&["a", "b"]),
            source,
            None,
            &CollectingSink::new(),
            &InMemoryCheckpointSink::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, SyncStatus::Failed);
    assert_eq!(report.partitions_completed, 1);
    assert_eq!(report.failures[0].partition, r#"{"id":"a"}"#);
    assert_eq!(report.failures[0].message, "partition reader panicked");
}

// ============================================================================
// Cancellation / Limits
// ============================================================================

#[tokio::test]
async fn test_global_cancellation_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let source = ScriptedSource::new(vec![("a", Script::Records(vec![json!({"n": 1})]))]);

    let report = ConcurrentReader::new(2)
        .with_cancellation(cancel)
        .read_stream(
            Arc::from("items"),
            slices(&["a", "b"]),
            source.clone(),
            None,
            &CollectingSink::new(),
            &InMemoryCheckpointSink::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, SyncStatus::Cancelled);
    assert_eq!(report.partitions_cancelled, 2);
    assert!(source.started().is_empty());
}

#[tokio::test]
async fn test_max_records_stops_without_closing_partition() {
    let data: Vec<_> = (1..=10).map(|n| json!({"n": n, "updated": n})).collect();
    let source = ScriptedSource::new(vec![("a", Script::Records(data))]);
    let messages = CollectingSink::new();
    let mut cursor = ConcurrentCursor::new(
        Arc::from("items"),
        CursorDefinition::new("updated"),
        StreamState::new(),
    );

    let report = ConcurrentReader::new(1)
        .with_max_records(Some(3))
        .read_stream(
            Arc::from("items"),
            slices(&["a"]),
            source,
            Some(&mut cursor),
            &messages,
            &InMemoryCheckpointSink::new(),
        )
        .await
        .unwrap();

    assert_eq!(ids(&messages.records("items")), vec![1, 2, 3]);
    assert_eq!(report.records, 3);
    assert_eq!(report.partitions_completed, 0);
    assert_eq!(report.partitions_cancelled, 1);
    assert!(cursor.get_checkpoint().is_empty());
}

// ============================================================================
// Checkpoints
// ============================================================================

#[tokio::test]
async fn test_state_emitted_as_partitions_close() {
    let source = ScriptedSource::new(vec![
        ("a", Script::Records(vec![json!({"n": 1, "updated": 10})])),
        ("b", Script::Records(vec![json!({"n": 2, "updated": 20})])),
    ]);
    let messages = CollectingSink::new();
    let checkpoints = InMemoryCheckpointSink::new();
    let mut initial = StreamState::new();
    initial.set_cursor_value("updated", json!(5));
    let mut cursor = ConcurrentCursor::new(
        Arc::from("items"),
        CursorDefinition::new("updated"),
        initial,
    );

    let report = ConcurrentReader::new(1)
        .read_stream(
            Arc::from("items"),
            slices(&["a", "b"]),
            source,
            Some(&mut cursor),
            &messages,
            &checkpoints,
        )
        .await
        .unwrap();

    // a closes while b is still pinned at 5; b's close releases 20
    assert_eq!(messages.states("items"), vec![json!({"updated": 20})]);
    assert_eq!(report.checkpoints, 1);
    assert_eq!(
        checkpoints.state().get_stream("items").unwrap().cursor_value("updated"),
        Some(&json!(20))
    );
}

#[tokio::test]
async fn test_mid_partition_checkpoints_for_single_ordered_partition() {
    let data: Vec<_> = (1..=5).map(|n| json!({"n": n, "updated": n})).collect();
    let source = ScriptedSource::new(vec![("a", Script::Records(data))]);
    let messages = CollectingSink::new();
    let checkpoints = InMemoryCheckpointSink::new();
    let mut cursor = ConcurrentCursor::new(
        Arc::from("items"),
        CursorDefinition::new("updated").with_checkpoint_interval(2),
        StreamState::new(),
    );

    ConcurrentReader::new(1)
        .read_stream(
            Arc::from("items"),
            slices(&["a"]),
            source,
            Some(&mut cursor),
            &messages,
            &checkpoints,
        )
        .await
        .unwrap();

    assert_eq!(
        messages.states("items"),
        vec![json!({"updated": 2}), json!({"updated": 4}), json!({"updated": 5})]
    );
    assert_eq!(checkpoints.history().len(), 3);

    // every state message follows the records it covers
    let kinds: Vec<_> = messages
        .messages()
        .iter()
        .map(|m| if m.is_state() { 'S' } else { 'R' })
        .collect();
    assert_eq!(kinds, vec!['R', 'R', 'S', 'R', 'R', 'S', 'R', 'S']);
}

#[test]
fn test_report_merge_keeps_worst_status() {
    let mut report = SyncReport::new();
    report.records = 2;
    report.merge(SyncReport {
        status: SyncStatus::Failed,
        records: 3,
        ..SyncReport::default()
    });
    report.merge(SyncReport {
        status: SyncStatus::Cancelled,
        ..SyncReport::default()
    });
    assert_eq!(report.status, SyncStatus::Failed);
    assert_eq!(report.records, 5);
    assert!(!report.is_success());
}
