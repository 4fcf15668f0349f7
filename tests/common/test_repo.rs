//! TestRepo builder for integration testing
//!
//! Creates a temporary test tree and wires a coordinator over an in-memory
//! SQLite store and a [`MemoryIndex`], so no network is needed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use tempfile::TempDir;

use case_indexer::fs_utils::to_forward_slashes;
use case_indexer::{CaseParser, CaseStore, MatchRules, MemoryIndex, RetryPolicy, SyncCoordinator};

/// Builder for creating test tree structures
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Root of the tree
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a file in the tree
    pub fn file(&self, relative_path: &str) -> PathBuf {
        self.dir.path().join(relative_path)
    }

    /// The `file_path` value stored for a file in the tree
    pub fn key(&self, relative_path: &str) -> String {
        to_forward_slashes(&self.file(relative_path))
    }

    /// Add a source file with the given content
    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.file(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    /// Add a file with raw bytes
    pub fn add_bytes(&self, relative_path: &str, content: &[u8]) -> &Self {
        let full_path = self.file(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    pub fn remove_file(&self, relative_path: &str) -> &Self {
        fs::remove_file(self.file(relative_path)).expect("Failed to remove file");
        self
    }

    pub fn remove_dir(&self, relative_path: &str) -> &Self {
        fs::remove_dir_all(self.file(relative_path)).expect("Failed to remove dir");
        self
    }

    /// Rename a file or directory inside the tree
    pub fn rename(&self, from: &str, to: &str) -> &Self {
        let target = self.file(to);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::rename(self.file(from), target).expect("Failed to rename");
        self
    }

    /// Rules with the project taken from the file's parent directory
    pub fn rules(&self) -> MatchRules {
        MatchRules {
            project_level: 1,
            ..MatchRules::default()
        }
    }

    /// Coordinator over an in-memory store and `index`, already set up
    pub fn coordinator(&self, index: &MemoryIndex) -> SyncCoordinator {
        let parser = CaseParser::new(self.rules(), "gbk").expect("parser");
        let mut coordinator = SyncCoordinator::new(
            CaseStore::open_in_memory().expect("store"),
            Box::new(index.clone()),
            parser,
            RetryPolicy::fixed(2, Duration::from_millis(10)),
        );
        coordinator.setup(false).expect("setup");
        coordinator
    }

    /// Write a config file for CLI runs. The store is `cases.db` in the tree
    /// root and the index points at a closed port.
    pub fn write_config(&self, extra: &str) -> PathBuf {
        let config = self.file("indexer.toml");
        let db = to_forward_slashes(&self.file("cases.db"));
        let content = format!(
            r#"[store]
path = "{db}"

[index]
url = "http://127.0.0.1:1"
timeout_secs = 2

[retry]
index_attempts = 1
fs_attempts = 1

[parser]
project_level = 1

{extra}
"#
        );
        fs::write(&config, content).expect("Failed to write config");
        config
    }

    /// Run the case-indexer binary from the tree root
    pub fn run_cli(&self, args: &[&str]) -> std::io::Result<Output> {
        Command::new(env!("CARGO_BIN_EXE_case-indexer"))
            .current_dir(self.path())
            .env_remove("RUST_LOG")
            .env_remove("CASE_INDEXER_CONFIG")
            .env_remove("CASE_INDEXER_INDEX_KEY")
            .args(args)
            .output()
    }

    /// Run CLI and expect success, return stdout
    pub fn run_cli_success(&self, args: &[&str]) -> String {
        let output = self.run_cli(args).expect("Failed to run CLI");
        assert!(
            output.status.success(),
            "CLI command {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    /// Run CLI and expect failure, return (exit code, stderr)
    pub fn run_cli_failure(&self, args: &[&str]) -> (Option<i32>, String) {
        let output = self.run_cli(args).expect("Failed to run CLI");
        assert!(
            !output.status.success(),
            "CLI command {:?} should have failed",
            args
        );
        (
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        )
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
