//! Execution engine module
//!
//! Turns declarative streams into running reads.
//!
//! # Overview
//!
//! The engine module provides:
//! - [`PartitionReader`] - the page loop of one partition (request, decode,
//!   select, paginate)
//! - [`DeclarativeStream`] - a stream's retriever, slicer, cursor and schema
//! - [`DeclarativeSource`] - `check`, `discover` and `read` over all streams
//! - [`SyncConfig`] - tunables of a read
//!
//! Reads hand each stream's partitions to the
//! [`ConcurrentReader`](crate::concurrent::ConcurrentReader). Parent streams
//! of substreams are read sequentially, without state, through the source's
//! [`ParentRecordSource`](crate::partition::ParentRecordSource)
//! implementation.

mod retriever;
mod source;
mod stream;
mod types;

pub use retriever::{PartitionReader, RetrieverDefinition};
pub use source::DeclarativeSource;
pub use stream::DeclarativeStream;
pub use types::SyncConfig;
