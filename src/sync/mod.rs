//! Live synchronization engine
//!
//! Keeps the relational store and the search index in step with the test
//! tree on disk.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   ChangeEvent   ┌────────────┐  &mut   ┌─────────────────┐
//! │ FileWatcher │───(mpsc queue)─>│ SyncWorker │────────>│ SyncCoordinator │
//! │  (notify)   │                 │  (thread)  │         │  store + index  │
//! └─────────────┘                 └────────────┘         └─────────────────┘
//!                                                                ▲
//!                              initial_scan / rescan ────────────┘
//! ```
//!
//! The worker is the only owner of the coordinator while watching, so events
//! are applied strictly in arrival order without a global lock.

pub mod coordinator;
pub mod events;
pub mod scanner;
pub mod watcher;
pub mod worker;

use std::path::PathBuf;

pub use coordinator::{
    FileSyncStats, ReconcileStats, ScanStats, SourceReader, SyncAction, SyncCoordinator,
};
pub use events::{EventEmitter, FileSyncedEvent, ReconcileCompletedEvent, RescanCompletedEvent};
pub use scanner::{collect_case_files, initial_scan};
pub use watcher::{classify, FileWatcher, WatcherHandle};
pub use worker::SyncWorker;

/// A classified filesystem change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A test file was created or its content changed
    FileChanged(PathBuf),
    /// A test file was deleted
    FileRemoved(PathBuf),
    /// A file was renamed to a name that follows the test file convention
    FileMoved { from: PathBuf, to: PathBuf },
    /// Something of unknown kind vanished; may have been a directory
    PathRemoved(PathBuf),
    /// The tree changed structurally; only a full rescan is safe
    Rescan { reason: String },
}

impl ChangeEvent {
    pub fn rescan(reason: impl Into<String>) -> Self {
        Self::Rescan {
            reason: reason.into(),
        }
    }
}
