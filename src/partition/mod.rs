//! Partition routing module
//!
//! Supports: single partition, static or templated lists, parent streams,
//! and datetime windows
//!
//! # Overview
//!
//! Partitions split a stream into independent units of work. This is useful for:
//! - Child resources that require a parent ID
//! - Date range slicing for large datasets
//! - Static list of values (e.g., regions, accounts)
//!
//! Parent streams are read to completion before the child's partitions are
//! produced; child partitions follow the parent's emission order.

mod routers;
mod types;

pub use routers::{
    DatetimeWindows, ListRouter, ListValues, ParentStreamConfig, PartitionRouter, StreamSlicer,
    SubstreamRouter, DEFAULT_DATETIME_FORMAT,
};
pub use types::{ParentRecordSource, PartitionKey, StreamSlice};

#[cfg(test)]
mod tests;
