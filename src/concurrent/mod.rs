//! Concurrent partition reader
//!
//! Runs many partition pipelines at once while keeping a single writer on
//! cursor state.
//!
//! # Overview
//!
//! - Up to K partitions run in parallel (`Semaphore` + `JoinSet`).
//! - Workers push [`QueueItem`]s into one bounded channel: records, then a
//!   completion sentinel or a failure.
//! - One consumer forwards records, drives the cursor and emits checkpoints.
//! - A failed partition is reported and never closed, so state cannot move
//!   past it. Siblings drain by default.

mod reader;
mod types;

pub use reader::{ConcurrentReader, PartitionSource, RecordSender};
pub use types::{
    FailurePolicy, PartitionFailure, QueueItem, SyncReport, SyncStatus, DEFAULT_CONCURRENCY,
    DEFAULT_QUEUE_CAPACITY, MAX_CONCURRENCY,
};

#[cfg(test)]
mod tests;
