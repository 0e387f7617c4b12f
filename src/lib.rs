// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy Declarative
//!
//! Executes declarative HTTP source connectors described by YAML manifests.
//!
//! ## Features
//!
//! - **Templates**: `{{ config.x }}`, filters and `now_utc()` in every string field
//! - **Pagination**: page increment, offset, cursor and link header strategies
//! - **Retries**: response filters, `Retry-After` aware backoff, per-partition budgets
//! - **Partitions**: list, substream and datetime-window slicing
//! - **Incremental Sync**: a concurrent cursor that only checkpoints completed work
//! - **Concurrency**: partitions read in parallel with ordered, bounded output
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_declarative::{load_source, CollectingSink, InMemoryCheckpointSink, State, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> solidafy_declarative::Result<()> {
//!     let config = serde_json::json!({ "api_key": "sk_test_..." });
//!     let source = load_source("manifests/stripe.yaml", config)?;
//!
//!     source.check().await?;
//!     let catalog = source.discover()?;
//!
//!     let messages = CollectingSink::new();
//!     let checkpoints = InMemoryCheckpointSink::new();
//!     let report = source
//!         .read(&SyncConfig::new(), &State::new(), &messages, &checkpoints)
//!         .await?;
//!     println!("{} streams, {} records", catalog.streams.len(), report.records);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  loader: manifest → DeclarativeSource (check, discover, read)   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬────────────┬────────────┐
//! │ Request  │ Response  │   Paginate    │ Partition  │   Output   │
//! ├──────────┼───────────┼───────────────┼────────────┼────────────┤
//! │ Template │ Decode    │ Page / Offset │ List       │ Records    │
//! │ Auth     │ Extract   │ Cursor        │ Substream  │ State      │
//! │ Retry    │ Filter    │ Link header   │ Datetime   │ Logs       │
//! └──────────┴───────────┴───────────────┴────────────┴────────────┘
//!                                │
//!          concurrent reader + cursor → message / checkpoint sinks
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Template interpolation
pub mod template;

/// Authentication
pub mod auth;

/// HTTP client, request options and the requester
pub mod http;

/// Error handling and backoff
pub mod retry;

/// Response decoders
pub mod decode;

/// Record extraction, filtering and transformation
pub mod extract;

/// Pagination strategies
pub mod pagination;

/// Partition routing and datetime windows
pub mod partition;

/// State, cursors and checkpoint sinks
pub mod state;

/// Concurrent partition reader
pub mod concurrent;

/// Protocol messages and sinks
pub mod output;

/// Declarative streams and sources
pub mod engine;

/// Manifest loader
pub mod loader;

/// Stream schemas
pub mod schema;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use engine::{DeclarativeSource, DeclarativeStream, SyncConfig};
pub use loader::{build_source, load_manifest, load_manifest_from_str, load_source, Manifest};
pub use output::{CollectingSink, JsonLinesSink, Message, MessageSink};
pub use state::{CheckpointSink, FileCheckpointSink, InMemoryCheckpointSink, State};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
