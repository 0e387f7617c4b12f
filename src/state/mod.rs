//! State management module
//!
//! Handles cursor tracking, checkpointing, and resumability.
//! State is persisted between sync runs to enable incremental syncs.
//!
//! # Overview
//!
//! The state module provides:
//! - [`State`] / [`StreamState`] - the persisted payload, one cursor mapping per stream
//! - [`ConcurrentCursor`] - merges partition progress into a safe low-water mark
//! - [`StateMigration`] - reshapes old state before a sync starts
//! - [`CheckpointSink`] - file and in-memory checkpoint persistence
//!
//! # Low-water mark
//!
//! When a partition closes, the global cursor moves to
//! `max(previous, min(max closed high-water mark, floors of open partitions))`.
//! An open partition's floor is its high-water mark while its records arrive
//! in ascending order, and its starting value otherwise, so a checkpoint never
//! skips data an in-flight partition may still deliver.

mod cursor;
mod migration;
mod sink;
mod types;

pub use cursor::{ConcurrentCursor, CursorDefinition, DEFAULT_START_KEY};
pub use migration::{apply_migrations, StateMigration};
pub use sink::{CheckpointSink, FileCheckpointSink, InMemoryCheckpointSink};
pub use types::{PartitionState, State, StreamState};

#[cfg(test)]
mod tests;
