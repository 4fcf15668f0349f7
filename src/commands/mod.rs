//! Command modules for the case-indexer CLI
//!
//! ## Architecture
//!
//! Each command module implements one or more top-level commands:
//! - `watch` - Initial scan plus live synchronization until interrupted
//! - `scan` - One-shot full scan, outbox replay and index rebuild
//! - `parse` - Print the cases of a single file without touching any store
//! - `query` - Search, project listing and status
//!
//! All command handlers take their respective `Args` struct from `cli.rs`
//! and a shared `CommandContext` for output format, verbosity and the
//! configuration file location.

pub mod parse;
pub mod query;
pub mod scan;
pub mod watch;

pub use parse::run_parse;
pub use query::{run_projects, run_search, run_status};
pub use scan::{run_reconcile, run_reindex, run_scan};
pub use watch::run_watch;

use std::path::{Path, PathBuf};

use crate::cli::{IndexArgs, OutputFormat, StoreArgs};
use crate::config::IndexerConfig;
use crate::error::{IndexerError, Result};
use crate::index::{MeiliIndex, RetryingIndex, SearchIndex};
use crate::parsing::CaseParser;
use crate::store::CaseStore;
use crate::sync::SyncCoordinator;

/// Shared context passed to all command handlers
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// Output format (text or json)
    pub format: OutputFormat,
    /// Show verbose output
    pub verbose: bool,
    /// Explicit configuration file
    pub config_path: Option<PathBuf>,
}

impl CommandContext {
    /// Create a new CommandContext from CLI args
    pub fn from_cli(format: OutputFormat, verbose: bool, config_path: Option<PathBuf>) -> Self {
        Self {
            format,
            verbose,
            config_path,
        }
    }

    /// Load the configuration this invocation runs with
    pub fn load_config(&self) -> Result<IndexerConfig> {
        IndexerConfig::load(self.config_path.as_deref())
    }

    /// Render a serializable result as pretty JSON
    pub fn to_json<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        serde_json::to_string_pretty(value)
            .map(|s| s + "\n")
            .map_err(|e| IndexerError::ConfigError {
                message: format!("Failed to serialize output: {}", e),
            })
    }
}

// ============================================
// CLI overrides
// ============================================

impl IndexArgs {
    /// Apply the flags that were given on top of `config`
    pub fn apply(&self, config: &mut IndexerConfig) {
        if let Some(url) = &self.index_url {
            config.index.url = url.clone();
        }
        if let Some(key) = &self.index_key {
            config.index.api_key = key.clone();
        }
        if let Some(name) = &self.index_name {
            config.index.name = name.clone();
        }
    }
}

impl StoreArgs {
    /// Apply the flags that were given on top of `config`
    pub fn apply(&self, config: &mut IndexerConfig) {
        if let Some(db) = &self.db {
            config.store.path = db.clone();
        }
        self.index.apply(config);
    }
}

/// Override the watched root if one was given on the command line
pub fn apply_root(config: &mut IndexerConfig, root: Option<&Path>) {
    if let Some(root) = root {
        config.watch.root = root.to_path_buf();
    }
}

// ============================================
// Wiring
// ============================================

/// Meilisearch client wrapped in the configured retry policy
pub fn open_index(config: &IndexerConfig) -> Result<Box<dyn SearchIndex>> {
    let meili = MeiliIndex::new(&config.index)?;
    Ok(Box::new(RetryingIndex::new(
        Box::new(meili),
        config.index_retry(),
    )))
}

/// Store, index and parser assembled into a coordinator.
///
/// Neither store is touched until [`SyncCoordinator::setup`] runs.
pub fn open_coordinator(config: &IndexerConfig) -> Result<SyncCoordinator> {
    let store = CaseStore::open(&config.store.path)?;
    let index = open_index(config)?;
    let parser = CaseParser::from_config(config)?;
    tracing::debug!(
        "[CMD] store={} index={}",
        config.store.path.display(),
        index.describe()
    );
    Ok(SyncCoordinator::new(store, index, parser, config.fs_retry()))
}
