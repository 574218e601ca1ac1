//! CLI parse: clap types for the janitor. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Synapse janitor - find oversized Matrix rooms and purge them with their state history
#[derive(Parser, Debug)]
#[command(name = "janitor")]
#[command(about = "Disk-space janitor for Matrix Synapse homeservers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Working directory (config/ and the default data directory live here)
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Count state rows per room now and save the snapshot
    Scan {
        /// Output format (text or json)
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
    /// Report the largest rooms from the last saved scan
    Rooms {
        /// Only rooms with more rows than this (defaults to scan.big_room_threshold)
        #[arg(long)]
        threshold: Option<u64>,
        /// Maximum rooms listed (defaults to scan.largest_rooms)
        #[arg(long)]
        limit: Option<usize>,
        /// Look up room names through the admin API
        #[arg(long)]
        names: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
    /// Delete rooms and their state history
    Purge {
        /// Room ids, e.g. '!abc:example.org'
        #[arg(required = true)]
        rooms: Vec<String>,
        /// Block the rooms so nobody can join them again
        #[arg(long)]
        ban: bool,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Resume an interrupted purge
    Resume,
    /// Show the saved purge progress
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
    /// Scan and report state rows left for the given rooms
    Verify {
        #[arg(required = true)]
        rooms: Vec<String>,
    },
    /// Run the scheduler in the foreground until interrupted
    Run,
}
