//! Message sinks
//!
//! Where protocol messages go: JSON lines on a writer (stdout for the CLI)
//! or an in-memory collector.

use super::message::Message;
use crate::error::{Error, Result};
use crate::types::JsonValue;
use async_trait::async_trait;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Receives every message of a run, in emission order
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Emit one message
    async fn emit(&self, message: Message) -> Result<()>;
}

// ============================================================================
// JSON Lines Sink
// ============================================================================

/// Writes one JSON document per line
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Sink over a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|_| Error::Other("Message writer lock poisoned".to_string()))
    }
}

impl JsonLinesSink<std::io::Stdout> {
    /// Sink over stdout
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> MessageSink for JsonLinesSink<W> {
    async fn emit(&self, message: Message) -> Result<()> {
        let line = serde_json::to_string(&message.to_json())?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::Other("Message writer lock poisoned".to_string()))?;
        writeln!(writer, "{line}")?;
        if !message.is_record() {
            writer.flush()?;
        }
        Ok(())
    }
}

// ============================================================================
// Collecting Sink
// ============================================================================

/// Keeps every message in memory
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message so far
    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Record data of one stream, in emission order
    pub fn records(&self, stream: &str) -> Vec<JsonValue> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                Message::Record {
                    stream: ref s,
                    data,
                    ..
                } if s.as_ref() == stream => Some(data),
                _ => None,
            })
            .collect()
    }

    /// State payloads of one stream, in emission order
    pub fn states(&self, stream: &str) -> Vec<JsonValue> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                Message::State { stream: s, data } if s == stream => Some(data),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessageSink for CollectingSink {
    async fn emit(&self, message: Message) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| Error::Other("Message sink lock poisoned".to_string()))?
            .push(message);
        Ok(())
    }
}
