//! CLI parse: clap types for sweepq. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sweepq CLI - inspect and drive the sweep queue of a versioned store
#[derive(Parser)]
#[command(name = "sweepq")]
#[command(about = "Sharded sweep queue for a multi-version key-value store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Database directory (overrides storage.db_path)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a table for sweeping with a fixed strategy
    Register {
        /// Fully qualified table name
        table: String,
        /// conservative or thorough
        strategy: String,
    },
    /// Write a value and queue the write for sweeping
    Put {
        table: String,
        row: String,
        column: String,
        value: String,
        /// Commit timestamp of the write (must be > 0)
        #[arg(long)]
        timestamp: u64,
    },
    /// Run sweep cycles
    Sweep {
        /// Exclusive ceiling: nothing at or above it is swept
        #[arg(long)]
        max_ts: u64,
        /// Sweep only this shard (requires --strategy)
        #[arg(long, requires = "strategy")]
        shard: Option<u32>,
        /// Strategy of the shard to sweep
        #[arg(long, requires = "shard")]
        strategy: Option<String>,
        /// Keep sweeping until caught up with --max-ts
        #[arg(long)]
        drain: bool,
    },
    /// Show per-shard progress and registered tables
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List cells of a table with the versions a sweep could remove
    Cells {
        table: String,
        /// Only report versions strictly below this timestamp
        #[arg(long)]
        max_ts: Option<u64>,
        /// Include sentinels in the output
        #[arg(long)]
        include_sentinels: bool,
    },
}
