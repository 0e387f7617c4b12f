//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands};
use crate::concurrent::{FailurePolicy, SyncStatus};
use crate::engine::{DeclarativeSource, SyncConfig};
use crate::error::{Error, Result};
use crate::loader::{build_source, load_manifest, Manifest};
use crate::output::{JsonLinesSink, Message, MessageSink};
use crate::state::{CheckpointSink, FileCheckpointSink, InMemoryCheckpointSink, State};
use crate::types::{JsonValue, LogLevel, SyncMode};
use serde_json::json;
use std::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the command, writing protocol messages to stdout
    pub async fn run(&self) -> Result<()> {
        self.run_with(&JsonLinesSink::stdout()).await
    }

    /// Run the command against any message sink
    pub async fn run_with(&self, messages: &dyn MessageSink) -> Result<()> {
        match &self.cli.command {
            Commands::Validate => self.validate(messages).await,
            Commands::Spec => self.spec(messages).await,
            Commands::Check => self.check(messages).await,
            Commands::Discover => self.discover(messages).await,
            Commands::Read {
                concurrency,
                max_records,
                checkpoint_interval,
                full_refresh,
                fail_fast,
                ..
            } => {
                let mut sync = SyncConfig::new().with_streams(self.cli.selected_streams());
                if let Some(concurrency) = concurrency {
                    sync = sync.with_concurrency(*concurrency);
                }
                if let Some(max) = max_records {
                    sync = sync.with_max_records(*max);
                }
                if let Some(interval) = checkpoint_interval {
                    sync = sync.with_checkpoint_interval(*interval);
                }
                if *full_refresh {
                    sync = sync.with_sync_mode(SyncMode::FullRefresh);
                }
                if *fail_fast {
                    sync = sync.with_failure_policy(FailurePolicy::CancelSiblings);
                }
                self.read(&sync, messages).await
            }
        }
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    fn load_manifest(&self) -> Result<Manifest> {
        let path = self
            .cli
            .connector
            .as_ref()
            .ok_or_else(|| Error::config("Manifest file not specified (use -c flag)"))?;
        load_manifest(path)
    }

    /// Inline config takes precedence over the config file
    fn load_config(&self) -> Result<JsonValue> {
        if let Some(json_str) = &self.cli.config_json {
            return serde_json::from_str(json_str)
                .map_err(|e| Error::config(format!("Invalid config JSON: {e}")));
        }

        if let Some(path) = &self.cli.config {
            let content = fs::read_to_string(path).map_err(|_| Error::FileNotFound {
                path: path.display().to_string(),
            })?;
            return serde_json::from_str(&content)
                .map_err(|e| Error::config(format!("Invalid config JSON: {e}")));
        }

        Ok(json!({}))
    }

    fn load_state(&self) -> Result<State> {
        if let Some(state_json) = &self.cli.state_json {
            State::from_json(state_json)
        } else if let Some(path) = &self.cli.state {
            State::from_file(path)
        } else {
            Ok(State::new())
        }
    }

    fn build_source(&self) -> Result<DeclarativeSource> {
        let manifest = self.load_manifest()?;
        build_source(&manifest, self.load_config()?)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    async fn validate(&self, messages: &dyn MessageSink) -> Result<()> {
        let manifest = self.load_manifest()?;
        messages
            .emit(Message::log(
                LogLevel::Info,
                format!(
                    "Manifest v{} is valid with {} streams: {}",
                    manifest.version,
                    manifest.streams.len(),
                    manifest.stream_names().join(", ")
                ),
            ))
            .await
    }

    async fn spec(&self, messages: &dyn MessageSink) -> Result<()> {
        let manifest = self.load_manifest()?;
        let spec = manifest.spec.map_or_else(
            || {
                json!({
                    "connectionSpecification": {
                        "type": "object",
                        "properties": {},
                        "required": []
                    }
                })
            },
            |spec| spec.to_value(),
        );
        messages.emit(Message::Spec(spec)).await
    }

    /// Emits a failed status instead of returning the error
    async fn check(&self, messages: &dyn MessageSink) -> Result<()> {
        let result = match self.build_source() {
            Ok(source) => source.check().await,
            Err(e) => Err(e),
        };
        let status = match result {
            Ok(()) => Message::ConnectionStatus {
                succeeded: true,
                message: None,
            },
            Err(e) => {
                warn!(error = %e, "Connection check failed");
                Message::ConnectionStatus {
                    succeeded: false,
                    message: Some(e.to_string()),
                }
            }
        };
        messages.emit(status).await
    }

    async fn discover(&self, messages: &dyn MessageSink) -> Result<()> {
        let catalog = self.build_source()?.discover()?;
        messages.emit(Message::Catalog(catalog)).await
    }

    async fn read(&self, sync: &SyncConfig, messages: &dyn MessageSink) -> Result<()> {
        let state = self.load_state()?;
        let cancel = CancellationToken::new();
        let source = self.build_source()?.with_cancellation(cancel.clone());

        let checkpoints: Box<dyn CheckpointSink> = match &self.cli.state {
            Some(path) => Box::new(FileCheckpointSink::with_state(path, state.clone())),
            None => Box::new(InMemoryCheckpointSink::new()),
        };

        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received interrupt, cancelling read");
                cancel.cancel();
            }
        });
        let report = source
            .read(sync, &state, messages, checkpoints.as_ref())
            .await;
        interrupt.abort();
        let report = report?;

        info!(
            records = report.records,
            partitions = report.partitions_completed,
            checkpoints = report.checkpoints,
            "Sync finished"
        );
        match report.status {
            SyncStatus::Succeeded => Ok(()),
            SyncStatus::Cancelled => Err(Error::Cancelled),
            SyncStatus::Failed => Err(Error::Other(format!(
                "{} partition(s) failed",
                report.failures.len()
            ))),
        }
    }
}
