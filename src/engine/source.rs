//! Declarative source: check, discover and read

use super::stream::{DeclarativeStream, StreamPartitionSource};
use super::types::SyncConfig;
use crate::auth::{AuthConfig, Authenticator};
use crate::concurrent::{
    ConcurrentReader, PartitionFailure, SyncReport, SyncStatus, DEFAULT_CONCURRENCY,
};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpRuntime};
use crate::output::{Catalog, Message, MessageSink};
use crate::partition::{ParentRecordSource, StreamSlice};
use crate::retry::{Sleeper, TokioSleeper};
use crate::state::{apply_migrations, CheckpointSink, ConcurrentCursor, State, StreamState};
use crate::types::{JsonValue, LogLevel, SyncMode};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A source assembled from declarative streams
#[derive(Debug, Clone)]
pub struct DeclarativeSource {
    streams: Vec<Arc<DeclarativeStream>>,
    check_streams: Vec<String>,
    spec: JsonValue,
    default_concurrency: usize,
    runtime: HttpRuntime,
}

impl DeclarativeSource {
    /// Create a source over streams sharing one HTTP client and config
    pub fn new(streams: Vec<DeclarativeStream>, client: Arc<HttpClient>, config: JsonValue) -> Self {
        let runtime = HttpRuntime {
            client,
            authenticator: Arc::new(AuthConfig::None),
            config: Arc::new(config),
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
        };
        Self {
            streams: streams.into_iter().map(Arc::new).collect(),
            check_streams: Vec::new(),
            spec: json!({}),
            default_concurrency: DEFAULT_CONCURRENCY,
            runtime,
        }
    }

    /// Streams whose first page proves the connection works
    #[must_use]
    pub fn with_check_streams(mut self, names: Vec<String>) -> Self {
        self.check_streams = names;
        self
    }

    /// Connection specification advertised by `spec`
    #[must_use]
    pub fn with_spec(mut self, spec: JsonValue) -> Self {
        self.spec = spec;
        self
    }

    /// Partitions read at once unless a read overrides it
    #[must_use]
    pub fn with_default_concurrency(mut self, concurrency: usize) -> Self {
        self.default_concurrency = concurrency;
        self
    }

    /// Replace the backoff sleeper
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.runtime.sleeper = sleeper;
        self
    }

    /// Use one authenticator for every stream
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.streams = self
            .streams
            .into_iter()
            .map(|stream| {
                let stream = Arc::unwrap_or_clone(stream);
                Arc::new(stream.with_authenticator(Arc::clone(&authenticator)))
            })
            .collect();
        self
    }

    /// Cancel reads through this token
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.runtime.cancel = cancel;
        self
    }

    /// Every stream in manifest order
    pub fn streams(&self) -> &[Arc<DeclarativeStream>] {
        &self.streams
    }

    /// Look up a stream by name
    pub fn stream(&self, name: &str) -> Result<&Arc<DeclarativeStream>> {
        self.streams
            .iter()
            .find(|s| s.name.as_ref() == name)
            .ok_or_else(|| Error::StreamNotFound {
                stream: name.to_string(),
            })
    }

    /// Connector configuration
    pub fn config(&self) -> &JsonValue {
        &self.runtime.config
    }

    /// Partitions read at once by default
    pub fn default_concurrency(&self) -> usize {
        self.default_concurrency
    }

    /// Connection specification
    pub fn spec(&self) -> &JsonValue {
        &self.spec
    }

    // ========================================================================
    // Check / Discover
    // ========================================================================

    /// Read the first page of each check stream
    ///
    /// Falls back to the first stream when no check streams are declared.
    pub async fn check(&self) -> Result<()> {
        let names: Vec<&str> = if self.check_streams.is_empty() {
            self.streams.iter().take(1).map(|s| s.name.as_ref()).collect()
        } else {
            self.check_streams.iter().map(String::as_str).collect()
        };

        for name in names {
            self.check_stream(name)
                .await
                .map_err(|e| Error::ConnectionCheck {
                    message: format!("Stream '{name}' is not readable: {e}"),
                })?;
            info!(stream = name, "Connection check passed");
        }
        Ok(())
    }

    async fn check_stream(&self, name: &str) -> Result<()> {
        let stream = self.stream(name)?;
        let slices = stream
            .slicer
            .partitions(SyncMode::FullRefresh, &StreamState::new(), self.config(), self)
            .await?;
        let Some(slice) = slices.into_iter().next() else {
            debug!(stream = name, "No partitions to check");
            return Ok(());
        };
        let mut reader = stream.partition_reader(Arc::new(slice), JsonValue::Null, self.runtime.clone());
        reader.next_page().await?;
        Ok(())
    }

    /// Catalog of every stream
    pub fn discover(&self) -> Result<Catalog> {
        let streams = self
            .streams
            .iter()
            .map(|stream| stream.catalog_entry(self.config()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Catalog { streams })
    }

    // ========================================================================
    // Read
    // ========================================================================

    /// Read the selected streams in order
    ///
    /// State migrations run for every selected stream before the first
    /// request; a migration error aborts the read. Partition failures are
    /// reported in the returned [`SyncReport`] and do not stop other
    /// streams.
    pub async fn read(
        &self,
        sync: &SyncConfig,
        state: &State,
        messages: &dyn MessageSink,
        checkpoints: &dyn CheckpointSink,
    ) -> Result<SyncReport> {
        let selected = if sync.streams.is_empty() {
            self.streams.clone()
        } else {
            sync.streams
                .iter()
                .map(|name| self.stream(name).cloned())
                .collect::<Result<Vec<_>>>()?
        };

        let mut prepared = Vec::with_capacity(selected.len());
        for stream in selected {
            let incoming = state
                .get_stream(&stream.name)
                .map_or(JsonValue::Null, StreamState::to_value);
            let migrated = apply_migrations(&stream.name, &stream.state_migrations, incoming)?;
            let stream_state = StreamState::from_value(migrated)?;
            prepared.push((stream, stream_state));
        }

        let concurrency = sync.concurrency.unwrap_or(self.default_concurrency);
        let reader = ConcurrentReader::new(concurrency)
            .with_failure_policy(sync.failure_policy)
            .with_max_records(sync.max_records)
            .with_cancellation(self.runtime.cancel.clone());

        let mut report = SyncReport::new();
        for (stream, stream_state) in prepared {
            if self.runtime.cancel.is_cancelled() {
                report.status = report.status.max(SyncStatus::Cancelled);
                break;
            }
            let stream_report = self
                .read_stream(&stream, stream_state, sync, &reader, messages, checkpoints)
                .await?;
            for failure in &stream_report.failures {
                messages
                    .emit(Message::log(LogLevel::Error, failure.to_string()))
                    .await?;
            }
            report.merge(stream_report);
        }

        info!(
            status = ?report.status,
            records = report.records,
            failures = report.failures.len(),
            "Read finished"
        );
        Ok(report)
    }

    async fn read_stream(
        &self,
        stream: &Arc<DeclarativeStream>,
        stream_state: StreamState,
        sync: &SyncConfig,
        reader: &ConcurrentReader,
        messages: &dyn MessageSink,
        checkpoints: &dyn CheckpointSink,
    ) -> Result<SyncReport> {
        let sync_mode = match (sync.sync_mode, stream.supports_incremental()) {
            (Some(SyncMode::Incremental), true) | (None, true) => SyncMode::Incremental,
            _ => SyncMode::FullRefresh,
        };
        messages
            .emit(Message::log(
                LogLevel::Info,
                format!("Starting {sync_mode:?} read of stream '{}'", stream.name),
            ))
            .await?;

        let slices = match stream
            .slicer
            .partitions(sync_mode, &stream_state, self.config(), self)
            .await
        {
            Ok(slices) => slices,
            Err(Error::Cancelled) => {
                let mut report = SyncReport::new();
                report.status = SyncStatus::Cancelled;
                return Ok(report);
            }
            Err(e) => {
                error!(stream = %stream.name, error = %e, "Failed to compute partitions");
                let mut report = SyncReport::new();
                report.status = SyncStatus::Failed;
                report
                    .failures
                    .push(PartitionFailure::from_error(&stream.name, &StreamSlice::empty(), &e));
                return Ok(report);
            }
        };

        let mut cursor = match (sync_mode, stream.cursor.as_ref()) {
            (SyncMode::Incremental, Some(definition)) => {
                let mut definition = definition.clone();
                if let Some(interval) = sync.checkpoint_interval {
                    definition = definition.with_checkpoint_interval(interval);
                }
                Some(ConcurrentCursor::new(
                    Arc::clone(&stream.name),
                    definition,
                    stream_state.clone(),
                ))
            }
            _ => None,
        };

        let source = Arc::new(StreamPartitionSource {
            stream: Arc::clone(stream),
            runtime: self.runtime.clone(),
            stream_state: stream_state.to_value(),
        });
        reader
            .read_stream(
                Arc::clone(&stream.name),
                slices.into_iter().map(Arc::new).collect(),
                source,
                cursor.as_mut(),
                messages,
                checkpoints,
            )
            .await
    }
}

#[async_trait]
impl ParentRecordSource for DeclarativeSource {
    async fn read_parent_records(&self, stream: &str, sync_mode: SyncMode) -> Result<Vec<JsonValue>> {
        let parent = self.stream(stream)?;
        let slices = parent
            .slicer
            .partitions(sync_mode, &StreamState::new(), self.config(), self)
            .await?;

        let mut records = Vec::new();
        for slice in slices {
            let mut reader = parent.partition_reader(Arc::new(slice), JsonValue::Null, self.runtime.clone());
            while let Some(page) = reader.next_page().await? {
                records.extend(page.into_iter().map(|record| record.data));
            }
        }
        debug!(parent = stream, records = records.len(), "Read parent stream");
        Ok(records)
    }
}
