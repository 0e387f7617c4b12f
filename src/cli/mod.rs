//! CLI module
//!
//! Command-line interface for running declarative connectors.
//!
//! # Commands
//!
//! - `validate` - Check that a manifest loads
//! - `spec` - Print the connector specification
//! - `check` - Read one page to test the connection
//! - `discover` - Print the catalog
//! - `read` - Read records, emitting state as partitions complete

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::Runner;

#[cfg(test)]
mod tests;
