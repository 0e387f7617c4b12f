//! Tests for cursor tracking, migrations and checkpoint sinks

use super::*;
use crate::partition::StreamSlice;
use crate::types::{JsonValue, Record};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn slice(id: i64) -> Arc<StreamSlice> {
    Arc::new(StreamSlice::empty().with_partition_value("id", id))
}

fn window(start: &str, end: &str) -> Arc<StreamSlice> {
    let cursor_slice = json!({"start_time": start, "end_time": end});
    Arc::new(StreamSlice::empty().with_cursor_slice(cursor_slice.as_object().cloned().unwrap()))
}

fn record(slice: &Arc<StreamSlice>, data: JsonValue) -> Record {
    Record::new(Arc::from("items"), data, Arc::clone(slice))
}

fn cursor(definition: CursorDefinition, state: JsonValue) -> ConcurrentCursor {
    ConcurrentCursor::new(
        Arc::from("items"),
        definition,
        StreamState::from_value(state).unwrap(),
    )
}

fn checkpoint_value(cursor: &ConcurrentCursor) -> Option<JsonValue> {
    cursor
        .get_checkpoint()
        .cursor_value(cursor.cursor_field())
        .cloned()
}

// ============================================================================
// Cursor Tests
// ============================================================================

#[test]
fn test_high_water_mark_is_monotonic() {
    let mut cursor = cursor(CursorDefinition::new("seq"), json!({}));
    let s = slice(1);
    cursor.open_partition(Arc::clone(&s));
    for seq in [5, 3, 7, 6] {
        cursor.observe(&record(&s, json!({"seq": seq}))).unwrap();
    }
    cursor.close_partition(&s).unwrap();
    assert_eq!(checkpoint_value(&cursor), Some(json!(7)));
}

#[test]
fn test_open_partition_pins_checkpoint() {
    let mut cursor = cursor(CursorDefinition::new("seq"), json!({"seq": 1}));
    let a = slice(1);
    let b = slice(2);
    cursor.open_partition(Arc::clone(&a));
    cursor.open_partition(Arc::clone(&b));

    cursor.observe(&record(&b, json!({"seq": 20}))).unwrap();
    cursor.observe(&record(&a, json!({"seq": 10}))).unwrap();
    cursor.close_partition(&a).unwrap();
    assert_eq!(checkpoint_value(&cursor), Some(json!(10)));

    // progress of the open partition alone never moves the checkpoint
    cursor.observe(&record(&b, json!({"seq": 30}))).unwrap();
    assert_eq!(checkpoint_value(&cursor), Some(json!(10)));

    cursor.close_partition(&b).unwrap();
    assert_eq!(checkpoint_value(&cursor), Some(json!(30)));
}

#[test]
fn test_unordered_open_partition_holds_at_start() {
    let mut cursor = cursor(CursorDefinition::new("seq"), json!({"seq": 1}));
    let a = slice(1);
    let b = slice(2);
    cursor.open_partition(Arc::clone(&a));
    cursor.open_partition(Arc::clone(&b));

    cursor.observe(&record(&b, json!({"seq": 40}))).unwrap();
    cursor.observe(&record(&b, json!({"seq": 35}))).unwrap();
    cursor.observe(&record(&a, json!({"seq": 50}))).unwrap();
    cursor.close_partition(&a).unwrap();
    assert_eq!(checkpoint_value(&cursor), Some(json!(1)));

    cursor.close_partition(&b).unwrap();
    assert_eq!(checkpoint_value(&cursor), Some(json!(50)));
}

#[test]
fn test_partition_without_start_blocks_advance() {
    let mut cursor = cursor(CursorDefinition::new("seq"), json!({}));
    let a = slice(1);
    let b = slice(2);
    cursor.open_partition(Arc::clone(&a));
    cursor.open_partition(Arc::clone(&b));
    cursor.observe(&record(&a, json!({"seq": 9}))).unwrap();
    cursor.close_partition(&a).unwrap();
    assert_eq!(checkpoint_value(&cursor), None);

    cursor.close_partition(&b).unwrap();
    assert_eq!(checkpoint_value(&cursor), Some(json!(9)));
}

#[test]
fn test_checkpoint_never_regresses() {
    let mut cursor = cursor(CursorDefinition::new("seq"), json!({"seq": 100}));
    let s = slice(1);
    cursor.open_partition(Arc::clone(&s));
    cursor.observe(&record(&s, json!({"seq": 50}))).unwrap();
    cursor.close_partition(&s).unwrap();
    assert_eq!(checkpoint_value(&cursor), Some(json!(100)));
}

#[test]
fn test_records_without_cursor_value_are_counted_only() {
    let mut cursor = cursor(CursorDefinition::new("seq"), json!({}));
    let s = slice(1);
    cursor.open_partition(Arc::clone(&s));
    cursor.observe(&record(&s, json!({"other": 1}))).unwrap();
    cursor.observe(&record(&s, json!({"seq": null}))).unwrap();
    cursor.close_partition(&s).unwrap();
    assert!(cursor.get_checkpoint().is_empty());
}

#[test]
fn test_datetime_windows_compare_across_formats() {
    let definition = CursorDefinition::new("updated_at").with_datetime_format("%Y-%m-%d %H:%M:%S");
    let mut cursor = cursor(definition, json!({}));
    let january = window("2024-01-01T00:00:00Z", "2024-01-31T23:59:59Z");
    let february = window("2024-02-01T00:00:00Z", "2024-02-29T23:59:59Z");
    cursor.open_partition(Arc::clone(&january));
    cursor.open_partition(Arc::clone(&february));

    cursor
        .observe(&record(&february, json!({"updated_at": "2024-02-10 08:00:00"})))
        .unwrap();
    cursor.close_partition(&february).unwrap();
    // january has read nothing and still pins the floor at its start
    assert_eq!(checkpoint_value(&cursor), Some(json!("2024-01-01T00:00:00Z")));

    cursor
        .observe(&record(&january, json!({"updated_at": "2024-01-20 12:00:00"})))
        .unwrap();
    cursor.close_partition(&january).unwrap();
    assert_eq!(checkpoint_value(&cursor), Some(json!("2024-02-10 08:00:00")));
}

#[test]
fn test_compare_values() {
    let definition = CursorDefinition::new("c");
    assert_eq!(definition.compare(&json!(10), &json!(9)), std::cmp::Ordering::Greater);
    assert_eq!(definition.compare(&json!(1.5), &json!(2)), std::cmp::Ordering::Less);
    assert_eq!(
        definition.compare(&json!("2024-01-02"), &json!("2024-01-01T23:00:00Z")),
        std::cmp::Ordering::Greater
    );
    assert_eq!(definition.compare(&json!("b"), &json!("a")), std::cmp::Ordering::Greater);
}

#[test]
fn test_per_partition_state() {
    let definition = CursorDefinition::new("updated_at").with_per_partition(true);
    let mut cursor = cursor(definition, json!({}));
    let a = slice(1);
    let b = slice(2);
    cursor.open_partition(Arc::clone(&a));
    cursor.open_partition(Arc::clone(&b));
    cursor
        .observe(&record(&a, json!({"updated_at": "2024-02-01"})))
        .unwrap();
    cursor.close_partition(&a).unwrap();

    let checkpoint = cursor.get_checkpoint();
    assert_eq!(
        serde_json::to_value(&checkpoint).unwrap(),
        json!({"states": [{"partition": {"id": 1}, "cursor": {"updated_at": "2024-02-01"}}]})
    );

    cursor
        .observe(&record(&b, json!({"updated_at": "2024-01-15"})))
        .unwrap();
    cursor.close_partition(&b).unwrap();
    let checkpoint = cursor.get_checkpoint();
    assert_eq!(checkpoint.cursor_value("updated_at"), Some(&json!("2024-02-01")));
    assert_eq!(checkpoint.states.len(), 2);
}

#[test]
fn test_per_partition_start_comes_from_state() {
    let definition = CursorDefinition::new("seq").with_per_partition(true);
    let mut cursor = cursor(
        definition,
        json!({"states": [{"partition": {"id": 1}, "cursor": {"seq": 5}}]}),
    );
    let a = slice(1);
    let b = slice(2);
    cursor.open_partition(Arc::clone(&a));
    cursor.open_partition(Arc::clone(&b));
    cursor.observe(&record(&a, json!({"seq": 3}))).unwrap();
    cursor.close_partition(&a).unwrap();
    // partition 1 read an older value than its stored cursor
    let checkpoint = cursor.get_checkpoint();
    assert_eq!(
        checkpoint.partition_cursor_value(&a.partition, "seq"),
        Some(&json!(5))
    );
}

#[test]
fn test_mid_partition_checkpoint_requires_single_ordered_partition() {
    let definition = CursorDefinition::new("seq").with_checkpoint_interval(2);
    let mut cursor = cursor(definition, json!({}));
    let s = slice(1);
    cursor.open_partition(Arc::clone(&s));

    cursor.observe(&record(&s, json!({"seq": 1}))).unwrap();
    assert!(!cursor.should_checkpoint());
    cursor.observe(&record(&s, json!({"seq": 2}))).unwrap();
    assert!(cursor.should_checkpoint());
    let state = cursor.checkpoint_in_flight().unwrap();
    assert_eq!(state.cursor_value("seq"), Some(&json!(2)));
    assert!(!cursor.should_checkpoint());

    cursor.observe(&record(&s, json!({"seq": 4}))).unwrap();
    cursor.observe(&record(&s, json!({"seq": 3}))).unwrap();
    assert!(!cursor.should_checkpoint());
    assert!(cursor.checkpoint_in_flight().is_none());
}

#[test]
fn test_mid_partition_checkpoint_disabled_with_siblings() {
    let definition = CursorDefinition::new("seq").with_checkpoint_interval(1);
    let mut cursor = cursor(definition, json!({}));
    let a = slice(1);
    let b = slice(2);
    cursor.open_partition(Arc::clone(&a));
    cursor.open_partition(Arc::clone(&b));
    cursor.observe(&record(&a, json!({"seq": 1}))).unwrap();
    assert!(!cursor.should_checkpoint());
}

#[test]
fn test_unknown_partition_errors() {
    let mut cursor = cursor(CursorDefinition::new("seq"), json!({}));
    let s = slice(1);
    assert!(cursor.observe(&record(&s, json!({"seq": 1}))).is_err());
    assert!(cursor.close_partition(&s).is_err());
}

// ============================================================================
// Migration Tests
// ============================================================================

#[test]
fn test_rename_cursor_field() {
    let migration = StateMigration::RenameCursorField {
        from: "updated".to_string(),
        to: "updated_at".to_string(),
    };
    let old = json!({
        "updated": "2024-01-01",
        "states": [{"partition": {"id": 1}, "cursor": {"updated": "2024-02-01"}}]
    });
    assert!(migration.should_migrate(&old));
    let migrated = migration.migrate(old).unwrap();
    assert_eq!(
        migrated,
        json!({
            "updated_at": "2024-01-01",
            "states": [{"partition": {"id": 1}, "cursor": {"updated_at": "2024-02-01"}}]
        })
    );
    assert!(!migration.should_migrate(&migrated));
}

#[test]
fn test_legacy_to_per_partition() {
    let migration = StateMigration::LegacyToPerPartition {
        partition_field: "parent_id".to_string(),
        cursor_field: "updated_at".to_string(),
    };
    let legacy = json!({
        "13": {"updated_at": "2024-01-01"},
        "abc": {"updated_at": "2024-02-01"}
    });
    assert!(migration.should_migrate(&legacy));
    let migrated = apply_migrations("comments", &[migration.clone()], legacy).unwrap();
    assert_eq!(
        migrated,
        json!({"states": [
            {"partition": {"parent_id": 13}, "cursor": {"updated_at": "2024-01-01"}},
            {"partition": {"parent_id": "abc"}, "cursor": {"updated_at": "2024-02-01"}}
        ]})
    );
    assert!(!migration.should_migrate(&migrated));
    assert!(!migration.should_migrate(&json!({"updated_at": "2024-01-01"})));
}

#[test]
fn test_malformed_legacy_state_fails() {
    let migration = StateMigration::LegacyToPerPartition {
        partition_field: "parent_id".to_string(),
        cursor_field: "updated_at".to_string(),
    };
    let malformed = json!({"13": {"cursor": "x"}});
    let err = apply_migrations("comments", &[migration], malformed).unwrap_err();
    assert!(matches!(err, crate::error::Error::StateMigration { .. }));
    assert!(err.to_string().contains("comments"));
}

#[test]
fn test_migration_deserialize() {
    let migrations: Vec<StateMigration> = serde_yaml::from_str(
        r"
- type: RenameCursorField
  from: updated
  to: updated_at
- type: LegacyToPerPartitionStateMigration
  partition_field: parent_id
  cursor_field: updated_at
",
    )
    .unwrap();
    assert_eq!(migrations.len(), 2);
}

// ============================================================================
// Sink Tests
// ============================================================================

#[tokio::test]
async fn test_in_memory_sink_history() {
    let sink = InMemoryCheckpointSink::new();
    let mut first = StreamState::new();
    first.set_cursor_value("seq", json!(1));
    let mut second = StreamState::new();
    second.set_cursor_value("seq", json!(2));

    sink.checkpoint("items", &first).await.unwrap();
    sink.checkpoint("items", &second).await.unwrap();

    assert_eq!(sink.history().len(), 2);
    assert_eq!(
        sink.state().get_stream("items").unwrap().cursor_value("seq"),
        Some(&json!(2))
    );
}

#[tokio::test]
async fn test_file_sink_writes_atomically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, r#"{"users": {"id": 3}}"#).unwrap();

    let sink = FileCheckpointSink::from_file(&path).unwrap();
    let mut items = StreamState::new();
    items.set_cursor_value("seq", json!(42));
    sink.checkpoint("items", &items).await.unwrap();

    assert!(!path.with_extension("tmp").exists());
    let persisted = State::from_file(&path).unwrap();
    assert_eq!(
        serde_json::to_value(&persisted).unwrap(),
        json!({"users": {"id": 3}, "items": {"seq": 42}})
    );
    assert_eq!(sink.state().await, persisted);
}
