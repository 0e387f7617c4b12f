//! State migrations
//!
//! Applied once to a stream's incoming state before any partition starts.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Reshapes previously persisted state into the current layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateMigration {
    /// Move the cursor stored under an old field name to a new one
    #[serde(alias = "RenameCursorField")]
    RenameCursorField {
        /// Old cursor field
        from: String,
        /// New cursor field
        to: String,
    },
    /// Convert `{"<parent id>": {"<cursor>": v}}` into a per-partition `states` list
    #[serde(alias = "LegacyToPerPartitionStateMigration", alias = "LegacyToPerPartition")]
    LegacyToPerPartition {
        /// Partition field the legacy keys are values of
        partition_field: String,
        /// Cursor field each legacy entry must carry
        cursor_field: String,
    },
}

impl StateMigration {
    /// True when the state has the shape this migration handles
    pub fn should_migrate(&self, state: &JsonValue) -> bool {
        let Some(object) = state.as_object() else {
            return false;
        };
        match self {
            StateMigration::RenameCursorField { from, to } => {
                object.contains_key(from) && !object.contains_key(to)
            }
            StateMigration::LegacyToPerPartition { cursor_field, .. } => {
                !object.is_empty()
                    && !object.contains_key("states")
                    && !object.contains_key(cursor_field)
                    && object.values().all(JsonValue::is_object)
            }
        }
    }

    /// Transform the state
    pub fn migrate(&self, state: JsonValue) -> Result<JsonValue> {
        let JsonValue::Object(mut object) = state else {
            return Err(Error::state_migration("Stream state must be a mapping"));
        };
        match self {
            StateMigration::RenameCursorField { from, to } => {
                if let Some(value) = object.remove(from) {
                    object.insert(to.clone(), value);
                }
                if let Some(JsonValue::Array(states)) = object.get_mut("states") {
                    for entry in states {
                        if let Some(cursor) = entry.get_mut("cursor").and_then(JsonValue::as_object_mut) {
                            if let Some(value) = cursor.remove(from) {
                                cursor.insert(to.clone(), value);
                            }
                        }
                    }
                }
                Ok(JsonValue::Object(object))
            }
            StateMigration::LegacyToPerPartition {
                partition_field,
                cursor_field,
            } => {
                let mut states = Vec::with_capacity(object.len());
                for (key, entry) in object {
                    let value = entry.get(cursor_field).cloned().ok_or_else(|| {
                        Error::state_migration(format!(
                            "Legacy state for partition '{key}' has no '{cursor_field}' value"
                        ))
                    })?;
                    let mut partition = JsonObject::new();
                    partition.insert(partition_field.clone(), legacy_partition_value(&key));
                    let mut cursor = JsonObject::new();
                    cursor.insert(cursor_field.clone(), value);
                    states.push(serde_json::json!({
                        "partition": partition,
                        "cursor": cursor,
                    }));
                }
                Ok(serde_json::json!({ "states": states }))
            }
        }
    }
}

/// Legacy keys are strings; integral ids are restored as numbers
fn legacy_partition_value(key: &str) -> JsonValue {
    key.parse::<i64>()
        .map(JsonValue::from)
        .unwrap_or_else(|_| JsonValue::String(key.to_string()))
}

/// Apply every matching migration in order
pub fn apply_migrations(stream: &str, migrations: &[StateMigration], state: JsonValue) -> Result<JsonValue> {
    let mut state = state;
    for migration in migrations {
        if migration.should_migrate(&state) {
            info!(stream, migration = ?migration, "Migrating stream state");
            state = migration.migrate(state).map_err(|e| match e {
                Error::StateMigration { message } => Error::state_migration(format!("{stream}: {message}")),
                other => other,
            })?;
        }
    }
    Ok(state)
}
