//! case-indexer configuration management.
//!
//! Handles the configuration file at:
//! - Linux/macOS: ~/.config/case-indexer/config.toml
//! - Windows: %APPDATA%\case-indexer\config.toml
//!
//! A missing file yields the defaults; CLI flags are applied on top by the
//! command handlers.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};
use crate::fs_utils;
use crate::parsing::MatchRules;
use crate::retry::RetryPolicy;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexerConfig {
    /// Drop and recreate the table and clear the index before the initial
    /// scan. Destroys all indexed data; development use only.
    #[serde(default)]
    pub recreate: bool,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub parser: ParserConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Watched tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Root of the test source tree
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Directory names skipped by both the scanner and the watcher
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from("../automation_code")
}

fn default_ignore_dirs() -> Vec<String> {
    [
        ".git",
        ".hg",
        ".svn",
        "__pycache__",
        ".pytest_cache",
        ".mypy_cache",
        ".venv",
        "venv",
        "node_modules",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            ignore_dirs: default_ignore_dirs(),
        }
    }
}

/// Relational store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("test_cases.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Meilisearch connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_url")]
    pub url: String,

    /// Master or API key; empty means no Authorization header
    #[serde(default)]
    pub api_key: String,

    /// Index uid
    #[serde(default = "default_index_name")]
    pub name: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Wait for each enqueued task to finish before continuing
    #[serde(default = "default_true")]
    pub wait_for_tasks: bool,

    /// Give up waiting for a task after this long
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
}

fn default_index_url() -> String {
    "http://localhost:7700".to_string()
}

fn default_index_name() -> String {
    "test_cases".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_task_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            api_key: String::new(),
            name: default_index_name(),
            timeout_secs: default_timeout_secs(),
            wait_for_tasks: true,
            task_timeout_secs: default_task_timeout_secs(),
        }
    }
}

/// Test discovery conventions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default = "default_test_prefix")]
    pub file_prefix: String,

    /// Source extension without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_test_prefix")]
    pub method_prefix: String,

    /// How many directories above the file the project name is taken from
    #[serde(default = "default_project_level")]
    pub project_level: usize,

    /// Encoding tried when a file is not valid UTF-8
    #[serde(default = "default_fallback_encoding")]
    pub fallback_encoding: String,
}

fn default_test_prefix() -> String {
    "test_".to_string()
}

fn default_extension() -> String {
    "py".to_string()
}

fn default_project_level() -> usize {
    2
}

fn default_fallback_encoding() -> String {
    "gbk".to_string()
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            file_prefix: default_test_prefix(),
            extension: default_extension(),
            method_prefix: default_test_prefix(),
            project_level: default_project_level(),
            fallback_encoding: default_fallback_encoding(),
        }
    }
}

/// Retry budgets for filesystem and index I/O
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_fs_attempts")]
    pub fs_attempts: u32,
    #[serde(default = "default_fs_delay_ms")]
    pub fs_delay_ms: u64,
    #[serde(default = "default_fs_backoff")]
    pub fs_backoff: f64,
    #[serde(default = "default_index_attempts")]
    pub index_attempts: u32,
    #[serde(default = "default_index_delay_ms")]
    pub index_delay_ms: u64,
    #[serde(default = "default_index_backoff")]
    pub index_backoff: f64,
}

fn default_fs_attempts() -> u32 {
    5
}

fn default_fs_delay_ms() -> u64 {
    1000
}

fn default_fs_backoff() -> f64 {
    1.0
}

fn default_index_attempts() -> u32 {
    4
}

fn default_index_delay_ms() -> u64 {
    250
}

fn default_index_backoff() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            fs_attempts: default_fs_attempts(),
            fs_delay_ms: default_fs_delay_ms(),
            fs_backoff: default_fs_backoff(),
            index_attempts: default_index_attempts(),
            index_delay_ms: default_index_delay_ms(),
            index_backoff: default_index_backoff(),
        }
    }
}

/// Sync worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How often the idle worker replays the index outbox
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

fn default_reconcile_interval_secs() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl IndexerConfig {
    /// Load configuration from an explicit path, or the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) if !path.exists() => Err(IndexerError::ConfigError {
                message: format!("Config file not found: {}", path.display()),
            }),
            Some(path) => Self::load_from(path),
            None => Self::load_from(&fs_utils::default_config_path()),
        }
    }

    /// Load configuration from a specific path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| IndexerError::ConfigError {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(IndexerError::ConfigError { message });

        if self.retry.fs_attempts == 0 || self.retry.index_attempts == 0 {
            return fail("retry attempts must be at least 1".into());
        }
        if self.retry.fs_backoff < 1.0 || self.retry.index_backoff < 1.0 {
            return fail("retry backoff must be >= 1.0".into());
        }
        if self.parser.project_level == 0 {
            return fail("parser.project_level must be at least 1".into());
        }
        if self.parser.extension.is_empty() || self.parser.extension.starts_with('.') {
            return fail(format!(
                "parser.extension must be a bare extension like \"py\", got {:?}",
                self.parser.extension
            ));
        }
        if encoding_rs::Encoding::for_label(self.parser.fallback_encoding.as_bytes()).is_none() {
            return fail(format!(
                "Unknown fallback encoding: {}",
                self.parser.fallback_encoding
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return fail(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }
        Ok(())
    }

    /// File and method matching rules for the parser, scanner and watcher
    pub fn match_rules(&self) -> MatchRules {
        MatchRules {
            file_prefix: self.parser.file_prefix.clone(),
            extension: self.parser.extension.clone(),
            method_prefix: self.parser.method_prefix.clone(),
            project_level: self.parser.project_level,
            ignore_dirs: self.watch.ignore_dirs.clone(),
        }
    }

    /// Retry policy for reading source files
    pub fn fs_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.fs_attempts,
            delay: Duration::from_millis(self.retry.fs_delay_ms),
            backoff: self.retry.fs_backoff,
        }
    }

    /// Retry policy for search index calls
    pub fn index_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.index_attempts,
            delay: Duration::from_millis(self.retry.index_delay_ms),
            backoff: self.retry.index_backoff,
        }
    }

    /// Idle interval between outbox replays
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.sync.reconcile_interval_secs.max(1))
    }
}
