//! case-indexer: a live index of Python test cases
//!
//! Watches a tree of Python test sources and keeps two stores in step with
//! it: a SQLite table of test cases (the source of truth) and a Meilisearch
//! index used for full-text search.
//!
//! A test case is a method named `test_*` inside a class in a file named
//! `test_*.py`. Each one is stored with its project name (a directory a
//! configurable number of levels above the file), the class and method
//! docstrings, and the exact source of the method.
//!
//! # Example
//!
//! ```ignore
//! use case_indexer::{CaseParser, CaseStore, MemoryIndex, RetryPolicy, SyncCoordinator};
//! use case_indexer::parsing::MatchRules;
//! use std::path::Path;
//!
//! let parser = CaseParser::new(MatchRules::default(), "gbk")?;
//! let mut coordinator = SyncCoordinator::new(
//!     CaseStore::open(Path::new("test_cases.db"))?,
//!     Box::new(MemoryIndex::new()),
//!     parser,
//!     RetryPolicy::none(),
//! );
//! coordinator.setup(false)?;
//! let stats = case_indexer::initial_scan(&mut coordinator, Path::new("suite"))?;
//! println!("{} cases", stats.cases_indexed);
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fs_utils;
pub mod index;
pub mod parsing;
pub mod retry;
pub mod schema;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use config::IndexerConfig;
pub use error::{IndexerError, Result};
pub use index::{IndexFilter, MeiliIndex, MemoryIndex, RetryingIndex, SearchIndex};
pub use parsing::{CaseParser, MatchRules};
pub use retry::RetryPolicy;
pub use schema::{document_id, CaseDocument, TestCase};
pub use store::CaseStore;
pub use sync::{
    collect_case_files, initial_scan, ChangeEvent, EventEmitter, FileWatcher, SyncCoordinator,
    SyncWorker,
};
