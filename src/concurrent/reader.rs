//! Bounded-parallel partition reader
//!
//! Partition workers run under a semaphore and push into one bounded
//! channel. The consumer is the only place that touches the cursor, the
//! message sink and the checkpoint sink.

use super::types::{
    FailurePolicy, PartitionFailure, QueueItem, SyncReport, SyncStatus, DEFAULT_CONCURRENCY,
    DEFAULT_QUEUE_CAPACITY, MAX_CONCURRENCY,
};
use crate::error::{Error, Result};
use crate::output::{Message, MessageSink};
use crate::partition::StreamSlice;
use crate::state::{CheckpointSink, ConcurrentCursor, StreamState};
use crate::types::Record;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reads one partition to completion
#[async_trait]
pub trait PartitionSource: Send + Sync {
    /// Send every record of the partition in read order
    ///
    /// Implementations stop early with [`Error::Cancelled`] once `cancel`
    /// fires.
    async fn read_partition(
        &self,
        slice: Arc<StreamSlice>,
        records: RecordSender,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Worker side of the results channel
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: mpsc::Sender<QueueItem>,
}

impl RecordSender {
    /// Send a record, waiting while the channel is full
    pub async fn send(&self, record: Record) -> Result<()> {
        self.tx
            .send(QueueItem::Record(record))
            .await
            .map_err(|_| Error::Cancelled)
    }
}

/// Runs the partitions of a stream with bounded parallelism
#[derive(Debug, Clone)]
pub struct ConcurrentReader {
    concurrency: usize,
    failure_policy: FailurePolicy,
    queue_capacity: usize,
    max_records: Option<u64>,
    cancel: CancellationToken,
}

impl Default for ConcurrentReader {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl ConcurrentReader {
    /// Reader running up to `concurrency` partitions at once (clamped to 1..=64)
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            failure_policy: FailurePolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_records: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the failure policy
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the results channel capacity
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Stop after emitting this many records
    #[must_use]
    pub fn with_max_records(mut self, max_records: Option<u64>) -> Self {
        self.max_records = max_records.filter(|&n| n > 0);
        self
    }

    /// Use a global cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Effective concurrency
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Read every slice of a stream
    ///
    /// Records are forwarded to `messages` as they arrive. When a cursor is
    /// given, every slice is opened before the first worker starts, each
    /// record is observed, and state is emitted whenever it advances.
    /// Failed partitions are reported, never closed.
    pub async fn read_stream(
        &self,
        stream: Arc<str>,
        slices: Vec<Arc<StreamSlice>>,
        source: Arc<dyn PartitionSource>,
        mut cursor: Option<&mut ConcurrentCursor>,
        messages: &dyn MessageSink,
        checkpoints: &dyn CheckpointSink,
    ) -> Result<SyncReport> {
        let stream_cancel = self.cancel.child_token();
        let _cancel_on_exit = stream_cancel.clone().drop_guard();

        if let Some(cursor) = cursor.as_deref_mut() {
            for slice in &slices {
                cursor.open_partition(Arc::clone(slice));
            }
        }
        let mut last_checkpoint = cursor.as_deref().map(ConcurrentCursor::get_checkpoint);

        info!(
            stream = %stream,
            partitions = slices.len(),
            concurrency = self.concurrency,
            "Reading stream"
        );

        let (tx, mut rx) = mpsc::channel(self.queue_capacity);
        let dispatcher = tokio::spawn(dispatch(
            Arc::clone(&stream),
            slices,
            source,
            tx,
            Arc::new(Semaphore::new(self.concurrency)),
            stream_cancel.clone(),
        ));

        let mut report = SyncReport::new();
        let mut limit_reached = false;

        while let Some(item) = rx.recv().await {
            match item {
                QueueItem::Record(record) => {
                    if limit_reached {
                        continue;
                    }
                    if let Some(cursor) = cursor.as_deref_mut() {
                        cursor.observe(&record)?;
                    }
                    messages
                        .emit(Message::record(Arc::clone(&record.stream), record.data))
                        .await?;
                    report.records += 1;

                    let in_flight = cursor
                        .as_deref_mut()
                        .and_then(ConcurrentCursor::checkpoint_in_flight);
                    if let Some(state) = in_flight {
                        self.emit_checkpoint(
                            &stream,
                            state,
                            &mut last_checkpoint,
                            &mut report,
                            messages,
                            checkpoints,
                        )
                        .await?;
                    }

                    if self.max_records.is_some_and(|max| report.records >= max) {
                        info!(stream = %stream, records = report.records, "Record limit reached");
                        limit_reached = true;
                        stream_cancel.cancel();
                    }
                }
                QueueItem::PartitionComplete(slice) => {
                    if limit_reached {
                        report.partitions_cancelled += 1;
                        continue;
                    }
                    report.partitions_completed += 1;
                    if let Some(cursor) = cursor.as_deref_mut() {
                        cursor.close_partition(&slice)?;
                        cursor.reset_checkpoint_counter();
                        let state = cursor.get_checkpoint();
                        self.emit_checkpoint(
                            &stream,
                            state,
                            &mut last_checkpoint,
                            &mut report,
                            messages,
                            checkpoints,
                        )
                        .await?;
                    }
                }
                QueueItem::PartitionFailed(slice, failure) => {
                    error!(
                        stream = %stream,
                        partition = %slice.key(),
                        status = ?failure.last_status,
                        attempts = failure.attempts,
                        error = %failure.message,
                        "Partition failed"
                    );
                    report.failures.push(failure);
                    report.status = report.status.max(SyncStatus::Failed);
                    if self.failure_policy == FailurePolicy::CancelSiblings {
                        stream_cancel.cancel();
                    }
                }
                QueueItem::PartitionCancelled(slice) => {
                    debug!(stream = %stream, partition = %slice.key(), "Partition cancelled");
                    report.partitions_cancelled += 1;
                }
            }
        }

        dispatcher
            .await
            .map_err(|e| Error::Other(format!("Partition dispatcher failed: {e}")))?;

        if self.cancel.is_cancelled() {
            report.status = report.status.max(SyncStatus::Cancelled);
        }
        info!(
            stream = %stream,
            status = ?report.status,
            records = report.records,
            completed = report.partitions_completed,
            failed = report.failures.len(),
            cancelled = report.partitions_cancelled,
            "Finished stream"
        );
        Ok(report)
    }

    async fn emit_checkpoint(
        &self,
        stream: &str,
        state: StreamState,
        last: &mut Option<StreamState>,
        report: &mut SyncReport,
        messages: &dyn MessageSink,
        checkpoints: &dyn CheckpointSink,
    ) -> Result<()> {
        if state.is_empty() || last.as_ref() == Some(&state) {
            return Ok(());
        }
        checkpoints.checkpoint(stream, &state).await?;
        messages
            .emit(Message::state(stream, state.to_value()))
            .await?;
        report.checkpoints += 1;
        *last = Some(state);
        Ok(())
    }
}

/// Start workers in slice order, each after acquiring a permit
async fn dispatch(
    stream: Arc<str>,
    slices: Vec<Arc<StreamSlice>>,
    source: Arc<dyn PartitionSource>,
    tx: mpsc::Sender<QueueItem>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    let mut workers = JoinSet::new();

    for slice in slices {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            let _ = tx.send(QueueItem::PartitionCancelled(slice)).await;
            continue;
        };

        let stream = Arc::clone(&stream);
        let source = Arc::clone(&source);
        let tx = tx.clone();
        let cancel = cancel.clone();
        workers.spawn(async move {
            let _permit = permit;
            let sender = RecordSender { tx: tx.clone() };
            let read = source.read_partition(Arc::clone(&slice), sender, cancel.clone());
            let item = match AssertUnwindSafe(read).catch_unwind().await {
                Ok(Ok(())) => QueueItem::PartitionComplete(slice),
                Ok(Err(Error::Cancelled)) => QueueItem::PartitionCancelled(slice),
                Ok(Err(e)) => {
                    let failure = PartitionFailure::from_error(&stream, &slice, &e);
                    QueueItem::PartitionFailed(slice, failure)
                }
                Err(_) => {
                    warn!(stream = %stream, partition = %slice.key(), "Partition reader panicked");
                    let failure = PartitionFailure {
                        stream: stream.to_string(),
                        partition: slice.key().to_string(),
                        last_status: None,
                        attempts: 0,
                        message: "partition reader panicked".to_string(),
                    };
                    QueueItem::PartitionFailed(slice, failure)
                }
            };
            let _ = tx.send(item).await;
        });
    }
    drop(tx);

    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            error!(stream = %stream, error = %e, "Partition worker aborted");
        }
    }
}
