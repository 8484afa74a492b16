//! CLI argument definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Git working directory status tracker
#[derive(Parser, Debug)]
#[command(name = "repo-tracker")]
#[command(about = "Track git working directory status and stream snapshots")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (applies to all commands)
    #[arg(short, long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,

    /// Config file (default: <config dir>/repo-tracker/config.toml)
    #[arg(long, global = true, env = "REPO_TRACKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the git executable
    #[arg(long, global = true)]
    pub git: Option<PathBuf>,

    /// Walk up from PATH to the nearest repository root
    #[arg(long, global = true)]
    pub discover: bool,

    /// Show verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan once and print the snapshot
    #[command(visible_alias = "st")]
    Status(StatusArgs),

    /// Follow a working directory, printing every new snapshot
    #[command(visible_alias = "w")]
    Watch(WatchArgs),

    /// Create a repository and print its first snapshot
    Init(InitArgs),
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Working directory
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Include ignored files
    #[arg(long)]
    pub ignored: bool,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Working directory
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Exit after this many snapshots (otherwise run until killed)
    #[arg(long)]
    pub count: Option<usize>,

    /// Override the debounce window in milliseconds
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Include ignored files
    #[arg(long)]
    pub ignored: bool,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON (one object per line for `watch`)
    Json,
}
