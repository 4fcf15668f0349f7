//! CLI argument definitions using clap with subcommand architecture
//!
//! Configuration comes from the TOML file; flags given here override it.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Keeps a searchable index of Python test cases in sync with a source tree
#[derive(Parser, Debug)]
#[command(name = "case-indexer")]
#[command(about = "Watches a test tree and mirrors its test cases into SQLite and Meilisearch")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: platform config dir)
    #[arg(short, long, global = true, env = "CASE_INDEXER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format (applies to all commands)
    #[arg(short, long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,

    /// Show verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan once, then keep both stores in sync with the tree until Ctrl-C
    #[command(visible_alias = "w")]
    Watch(WatchArgs),

    /// Index the whole tree once, pruning files no longer on disk
    Scan(ScanArgs),

    /// Replay pending index updates from the store
    Reconcile(StoreArgs),

    /// Rebuild the search index from the store
    Reindex(StoreArgs),

    /// Print the test cases found in one file
    Parse(ParseArgs),

    /// Full-text search against the index
    #[command(visible_alias = "s")]
    Search(SearchArgs),

    /// List distinct project names in the index
    Projects(IndexArgs),

    /// Show store statistics and pending index updates
    Status(StoreArgs),
}

// ============================================
// Shared overrides
// ============================================

/// Overrides for the relational store
#[derive(Args, Debug, Default, Clone)]
pub struct StoreArgs {
    /// SQLite database file
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[command(flatten)]
    pub index: IndexArgs,
}

/// Overrides for the search index
#[derive(Args, Debug, Default, Clone)]
pub struct IndexArgs {
    /// Meilisearch URL
    #[arg(long, value_name = "URL")]
    pub index_url: Option<String>,

    /// Meilisearch API key
    #[arg(long, value_name = "KEY", env = "CASE_INDEXER_INDEX_KEY", hide_env_values = true)]
    pub index_key: Option<String>,

    /// Index uid
    #[arg(long, value_name = "NAME")]
    pub index_name: Option<String>,
}

// ============================================
// Subcommand arguments
// ============================================

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Root of the test tree
    #[arg(value_name = "ROOT")]
    pub root: Option<PathBuf>,

    /// Drop the table and clear the index before the initial scan (destroys data)
    #[arg(long)]
    pub recreate: bool,

    /// Skip the initial scan; only apply live changes
    #[arg(long)]
    pub no_initial_scan: bool,

    /// Emit one JSON line per processed change on stdout
    #[arg(long)]
    pub events: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Root of the test tree
    #[arg(value_name = "ROOT")]
    pub root: Option<PathBuf>,

    /// Drop and recreate the table first (destroys data)
    #[arg(long)]
    pub recreate: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    /// Python test file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Directory level above the file used as project name
    #[arg(long, value_name = "N")]
    pub project_level: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Free-text query
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Maximum number of hits
    #[arg(long, default_value = "20")]
    pub limit: usize,

    #[command(flatten)]
    pub index: IndexArgs,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}
