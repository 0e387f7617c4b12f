//! Engine types
//!
//! Tunables of a read.

use crate::concurrent::FailurePolicy;
use crate::types::SyncMode;

/// Configuration for a read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncConfig {
    /// Streams to read in order; empty means every stream
    pub streams: Vec<String>,
    /// Partitions read at once; the manifest default when unset
    pub concurrency: Option<usize>,
    /// Maximum records per stream
    pub max_records: Option<u64>,
    /// What happens to sibling partitions when one fails
    pub failure_policy: FailurePolicy,
    /// Mid-partition checkpoint interval, in records
    pub checkpoint_interval: Option<u64>,
    /// Force a sync mode instead of deriving it from the stream's cursor
    pub sync_mode: Option<SyncMode>,
}

impl SyncConfig {
    /// Create a new sync config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read only these streams
    #[must_use]
    pub fn with_streams<I, S>(mut self, streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.streams = streams.into_iter().map(Into::into).collect();
        self
    }

    /// Set the number of partitions read at once
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Set max records per stream
    #[must_use]
    pub fn with_max_records(mut self, max: u64) -> Self {
        self.max_records = Some(max);
        self
    }

    /// Set the failure policy
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Checkpoint every `records` records while a single partition is open
    #[must_use]
    pub fn with_checkpoint_interval(mut self, records: u64) -> Self {
        self.checkpoint_interval = Some(records);
        self
    }

    /// Force a sync mode
    #[must_use]
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = Some(mode);
        self
    }
}
