//! Concurrent reader types

use crate::error::Error;
use crate::partition::StreamSlice;
use crate::types::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Partition pipelines run at once unless configured otherwise
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound on partition pipelines
pub const MAX_CONCURRENCY: usize = 64;

/// Capacity of the results channel
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// What happens to sibling partitions when one fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Let the other partitions finish
    #[default]
    Drain,
    /// Cancel every other partition of the stream
    CancelSiblings,
}

/// A partition that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionFailure {
    /// Stream name
    pub stream: String,
    /// Partition key
    pub partition: String,
    /// Last HTTP status seen, if any
    pub last_status: Option<u16>,
    /// Attempts spent on the failing request
    pub attempts: u32,
    /// Failure description
    pub message: String,
}

impl PartitionFailure {
    /// Describe the error that ended a partition
    pub fn from_error(stream: &str, slice: &StreamSlice, error: &Error) -> Self {
        Self {
            stream: stream.to_string(),
            partition: slice.key().to_string(),
            last_status: error.status(),
            attempts: error.attempts(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for PartitionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stream '{}' partition {} failed after {} attempt(s)",
            self.stream, self.partition, self.attempts
        )?;
        if let Some(status) = self.last_status {
            write!(f, " (last status {status})")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Item sent from partition workers to the consumer
#[derive(Debug)]
pub enum QueueItem {
    /// A record read under a partition
    Record(Record),
    /// Every record of the partition has been sent
    PartitionComplete(Arc<StreamSlice>),
    /// The partition ended with an error
    PartitionFailed(Arc<StreamSlice>, PartitionFailure),
    /// The partition was cancelled before it completed
    PartitionCancelled(Arc<StreamSlice>),
}

/// Overall outcome of a run, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Every partition completed
    #[default]
    Succeeded,
    /// The run was cancelled
    Cancelled,
    /// At least one partition failed
    Failed,
}

/// Summary of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// Worst outcome
    pub status: SyncStatus,
    /// Records emitted
    pub records: u64,
    /// Partitions that completed
    pub partitions_completed: usize,
    /// Partitions cancelled before completing
    pub partitions_cancelled: usize,
    /// State messages emitted
    pub checkpoints: usize,
    /// Failed partitions
    pub failures: Vec<PartitionFailure>,
}

impl SyncReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: SyncReport) {
        self.status = self.status.max(other.status);
        self.records += other.records;
        self.partitions_completed += other.partitions_completed;
        self.partitions_cancelled += other.partitions_cancelled;
        self.checkpoints += other.checkpoints;
        self.failures.extend(other.failures);
    }

    /// True if every partition completed
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Succeeded
    }
}
