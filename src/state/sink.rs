//! Checkpoint sinks
//!
//! Receive stream state snapshots as they are emitted. The file sink keeps
//! the whole source state on disk and rewrites it atomically.

use super::types::{State, StreamState};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// Destination for emitted checkpoints
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    /// Persist the latest state of a stream
    async fn checkpoint(&self, stream: &str, state: &StreamState) -> Result<()>;
}

// ============================================================================
// In-Memory Sink
// ============================================================================

/// Keeps every checkpoint in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointSink {
    inner: Arc<Mutex<(State, Vec<(String, StreamState)>)>>,
}

impl InMemoryCheckpointSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest state of every stream
    pub fn state(&self) -> State {
        self.inner
            .lock()
            .map(|guard| guard.0.clone())
            .unwrap_or_default()
    }

    /// Every checkpoint in emission order
    pub fn history(&self) -> Vec<(String, StreamState)> {
        self.inner
            .lock()
            .map(|guard| guard.1.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CheckpointSink for InMemoryCheckpointSink {
    async fn checkpoint(&self, stream: &str, state: &StreamState) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| Error::state("Checkpoint sink lock poisoned"))?;
        guard.0.set_stream(stream, state.clone());
        guard.1.push((stream.to_string(), state.clone()));
        Ok(())
    }
}

// ============================================================================
// File Sink
// ============================================================================

/// Persists the source state to a JSON file
#[derive(Debug)]
pub struct FileCheckpointSink {
    path: PathBuf,
    state: AsyncMutex<State>,
}

impl FileCheckpointSink {
    /// Create a sink writing to `path`, starting from its existing contents
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = State::from_file(&path)?;
        Ok(Self {
            path,
            state: AsyncMutex::new(state),
        })
    }

    /// Create a sink writing to `path`, starting from the given state
    pub fn with_state(path: impl AsRef<Path>, state: State) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: AsyncMutex::new(state),
        }
    }

    /// The state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the persisted state
    pub async fn state(&self) -> State {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl CheckpointSink for FileCheckpointSink {
    async fn checkpoint(&self, stream: &str, state: &StreamState) -> Result<()> {
        let mut current = self.state.lock().await;
        current.set_stream(stream, state.clone());
        let contents = current.to_json_pretty()?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::state(format!("Failed to write state file: {e}")))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::state(format!("Failed to rename state file: {e}")))?;

        debug!(stream, path = %self.path.display(), "Checkpoint written");
        Ok(())
    }
}
