//! Output module
//!
//! Protocol messages and the sinks they are written to.
//!
//! # Overview
//!
//! This module provides:
//! - [`Message`] - records, state, logs, connection status, catalog, spec
//! - [`MessageSink`] - JSON lines writer and in-memory collector

mod message;
mod writer;

pub use message::{Catalog, CatalogStream, Message};
pub use writer::{CollectingSink, JsonLinesSink, MessageSink};
