//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Declarative connector runner
#[derive(Parser, Debug)]
#[command(name = "solidafy-declarative")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Connector manifest (YAML or JSON)
    #[arg(short, long, global = true)]
    pub connector: Option<PathBuf>,

    /// Configuration file (JSON)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Inline config JSON
    #[arg(long, global = true)]
    pub config_json: Option<String>,

    /// State file (JSON); checkpoints are written back to it
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Inline state JSON
    #[arg(long, global = true)]
    pub state_json: Option<String>,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Validate the manifest
    Validate,

    /// Show the connector specification
    Spec,

    /// Test the connection by reading one page
    Check,

    /// List streams with their schemas
    Discover,

    /// Read records from streams
    Read {
        /// Streams to read (comma-separated, empty = all)
        #[arg(long)]
        streams: Option<String>,

        /// Partitions read at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Maximum records per stream
        #[arg(long)]
        max_records: Option<u64>,

        /// Records between mid-partition checkpoints
        #[arg(long)]
        checkpoint_interval: Option<u64>,

        /// Ignore cursors and read everything
        #[arg(long)]
        full_refresh: bool,

        /// Cancel the other partitions of a stream when one fails
        #[arg(long)]
        fail_fast: bool,
    },
}

impl Cli {
    /// Stream names selected by `read --streams`
    pub fn selected_streams(&self) -> Vec<String> {
        match &self.command {
            Commands::Read {
                streams: Some(streams),
                ..
            } => streams
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}
