//! Single-consumer sync worker
//!
//! Owns the [`SyncCoordinator`] for the lifetime of a watch session and
//! applies [`ChangeEvent`]s strictly in arrival order. When idle it replays
//! the index outbox every `reconcile_interval`.
//!
//! A rescan-triggering event drains everything already queued first: the
//! rescan reads the tree as it is now, which supersedes those events. A
//! rescan that fails stays owed: it is retried on the next event or idle
//! tick until it succeeds.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::fs_utils::to_forward_slashes;

use super::coordinator::{FileSyncStats, ScanStats, SyncCoordinator};
use super::events::{
    EventEmitter, FileSyncedEvent, ReconcileCompletedEvent, RescanCompletedEvent,
};
use super::ChangeEvent;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Applies queued change events to the coordinator
pub struct SyncWorker {
    coordinator: SyncCoordinator,
    root: PathBuf,
    emitter: EventEmitter,
    reconcile_interval: Duration,
    last_reconcile: Instant,
    /// Reason of a rescan that failed and must be retried
    pending_rescan: Option<String>,
}

impl SyncWorker {
    pub fn new(
        coordinator: SyncCoordinator,
        root: &Path,
        emitter: EventEmitter,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            root: root.to_path_buf(),
            emitter,
            reconcile_interval,
            last_reconcile: Instant::now(),
            pending_rescan: None,
        }
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Reason of a failed rescan still waiting to be retried
    pub fn pending_rescan(&self) -> Option<&str> {
        self.pending_rescan.as_deref()
    }

    /// Give the coordinator back, e.g. to close it
    pub fn into_coordinator(self) -> SyncCoordinator {
        self.coordinator
    }

    /// Run on a dedicated thread until the queue closes or `running` clears.
    ///
    /// The thread returns the coordinator so the caller can close it.
    pub fn spawn(
        self,
        events: Receiver<ChangeEvent>,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<SyncCoordinator>> {
        std::thread::Builder::new()
            .name("case-indexer-worker".into())
            .spawn(move || self.run(events, running))
    }

    /// Event loop; blocks the calling thread
    pub fn run(mut self, events: Receiver<ChangeEvent>, running: Arc<AtomicBool>) -> SyncCoordinator {
        tracing::info!("[WORKER] Started");
        while running.load(Ordering::SeqCst) {
            match events.recv_timeout(POLL_INTERVAL) {
                Ok(event) => match self.rescan_due(&event) {
                    Some((reason, superseded)) => {
                        let superseded = superseded + drain(&events);
                        self.rescan(&reason, superseded);
                    }
                    None => self.handle(event),
                },
                Err(RecvTimeoutError::Timeout) => self.tick(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::info!("[WORKER] Stopped");
        self.coordinator
    }

    /// Apply one event. Failures are logged and do not stop the worker.
    pub fn handle(&mut self, event: ChangeEvent) {
        if let Some((reason, superseded)) = self.rescan_due(&event) {
            self.rescan(&reason, superseded);
            return;
        }

        let (label, result) = match &event {
            ChangeEvent::FileChanged(path) => (path.clone(), self.coordinator.update(path)),
            ChangeEvent::FileRemoved(path) => (path.clone(), self.coordinator.delete(path)),
            ChangeEvent::FileMoved { from, to } => (to.clone(), self.coordinator.relocate(from, to)),
            ChangeEvent::PathRemoved(path) => {
                tracing::debug!("[WORKER] Ignoring removal of untracked {}", path.display());
                return;
            }
            ChangeEvent::Rescan { .. } => return,
        };
        self.report(&label, result);
    }

    /// Retry an owed rescan or replay the outbox, if the interval elapsed
    pub fn tick(&mut self) {
        if self.last_reconcile.elapsed() < self.reconcile_interval {
            return;
        }
        self.last_reconcile = Instant::now();
        if let Some(reason) = self.pending_rescan.take() {
            // A successful rescan also empties the outbox
            self.rescan(&reason, 0);
            return;
        }
        if let Err(e) = self.reconcile() {
            tracing::warn!("[WORKER] Reconcile failed: {}", e);
        }
    }

    fn reconcile(&mut self) -> Result<()> {
        if self.coordinator.store().pending_paths()?.is_empty() {
            return Ok(());
        }
        let stats = self.coordinator.reconcile()?;
        self.emitter.emit(&ReconcileCompletedEvent::from(&stats));
        Ok(())
    }

    /// Rescan to run instead of `event`, with the number of events it
    /// supersedes. An owed rescan supersedes `event` itself.
    fn rescan_due(&mut self, event: &ChangeEvent) -> Option<(String, usize)> {
        if let Some(reason) = self.pending_rescan.take() {
            return Some((reason, 1));
        }
        self.rescan_reason(event).map(|reason| (reason, 0))
    }

    /// Why `event` needs a full rescan, if it does.
    ///
    /// An unknown removal only matters when stored files lived under it.
    fn rescan_reason(&self, event: &ChangeEvent) -> Option<String> {
        match event {
            ChangeEvent::Rescan { reason } => Some(reason.clone()),
            ChangeEvent::PathRemoved(path) => {
                let prefix = format!("{}/", to_forward_slashes(path).trim_end_matches('/'));
                match self.coordinator.store().has_files_under(&prefix) {
                    Ok(true) => Some(format!("directory {} removed", path.display())),
                    Ok(false) => None,
                    Err(e) => {
                        tracing::error!("[WORKER] Store lookup failed: {}", e);
                        Some("store lookup failed".to_string())
                    }
                }
            }
            _ => None,
        }
    }

    fn rescan(&mut self, reason: &str, superseded: usize) {
        tracing::info!(
            "[WORKER] Rescanning ({}), {} queued events superseded",
            reason,
            superseded
        );
        match self.coordinator.rescan(&self.root) {
            Ok(stats) => self.report_rescan(reason, superseded, &stats),
            Err(e) => {
                tracing::error!("[WORKER] Rescan failed, will retry: {}", e);
                self.pending_rescan = Some(reason.to_string());
            }
        }
    }

    fn report_rescan(&self, reason: &str, superseded: usize, stats: &ScanStats) {
        tracing::info!(
            "[WORKER] Rescan indexed {} cases from {} files in {}ms",
            stats.cases_indexed,
            stats.files_scanned,
            stats.duration_ms
        );
        self.emitter
            .emit(&RescanCompletedEvent::new(reason, superseded, stats));
    }

    fn report(&self, path: &Path, result: Result<FileSyncStats>) {
        match result {
            Ok(stats) => self.emitter.emit(&FileSyncedEvent::from(&stats)),
            Err(e) => tracing::error!("[WORKER] Failed to sync {}: {}", path.display(), e),
        }
    }
}

/// Discard everything already queued; returns how many events were dropped
fn drain(events: &Receiver<ChangeEvent>) -> usize {
    events.try_iter().count()
}
