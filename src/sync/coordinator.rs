//! Per-file replace protocol across the store and the index
//!
//! Every mutation follows the same order:
//!
//! ```text
//! read (retried) ─> parse ─> BEGIN
//!                              delete rows of file
//!                              insert fresh rows
//!                              queue file in index_outbox
//!                            COMMIT ─> mirror rows to index ─> dequeue
//! ```
//!
//! A failed transaction rolls back and never reaches the index. A failed
//! mirror leaves the outbox entry behind; [`SyncCoordinator::reconcile`]
//! replays it later from the committed rows.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::error::{IndexerError, Result};
use crate::fs_utils::to_forward_slashes;
use crate::index::{IndexFilter, SearchIndex};
use crate::parsing::CaseParser;
use crate::retry::{self, retry_with_policy, RetryPolicy};
use crate::schema::{CaseDocument, TestCase};
use crate::store::CaseStore;

use super::scanner::collect_case_files;

/// Documents sent per request when rebuilding the whole index
const REBUILD_BATCH: usize = 1000;

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Updated,
    Deleted,
    Moved,
}

/// Statistics for one file-level operation
#[derive(Debug, Clone, Serialize)]
pub struct FileSyncStats {
    pub action: SyncAction,
    /// Normalized path of the file (the destination for moves)
    pub file_path: String,
    /// Source path of a move
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    pub cases_removed: usize,
    pub cases_added: usize,
    /// Whether the index now mirrors the committed rows
    pub mirrored: bool,
    pub duration_ms: u64,
}

impl FileSyncStats {
    fn new(action: SyncAction, file_path: String) -> Self {
        Self {
            action,
            file_path,
            previous_path: None,
            cases_removed: 0,
            cases_added: 0,
            mirrored: false,
            duration_ms: 0,
        }
    }
}

/// Statistics for a full or initial scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub files_failed: usize,
    /// Stored files no longer present on disk
    pub files_pruned: usize,
    pub cases_indexed: usize,
    /// Files committed but left in the outbox because the index was down
    pub mirror_deferred: usize,
    pub duration_ms: u64,
}

/// Result of replaying the outbox
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileStats {
    pub replayed: usize,
    pub remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reads the raw bytes of a source file
pub type SourceReader = Box<dyn Fn(&Path) -> io::Result<Vec<u8>> + Send>;

/// Single owner of both stores; every mutation goes through here
pub struct SyncCoordinator {
    store: CaseStore,
    index: Box<dyn SearchIndex>,
    parser: CaseParser,
    fs_retry: RetryPolicy,
    reader: SourceReader,
}

impl SyncCoordinator {
    pub fn new(
        store: CaseStore,
        index: Box<dyn SearchIndex>,
        parser: CaseParser,
        fs_retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            index,
            parser,
            fs_retry,
            reader: Box::new(|path: &Path| fs::read(path)),
        }
    }

    /// Replace how source files are read (defaults to [`fs::read`])
    pub fn with_reader(mut self, reader: SourceReader) -> Self {
        self.reader = reader;
        self
    }

    /// Prepare both stores. With `recreate`, wipe the index and recreate
    /// the tables; all indexed data is lost.
    pub fn setup(&mut self, recreate: bool) -> Result<()> {
        self.index.ensure_ready()?;
        if recreate {
            tracing::warn!("[SYNC] Destructive reinit: clearing {}", self.index.describe());
            self.index.delete_all()?;
        }
        self.store.setup(recreate)
    }

    pub fn store(&self) -> &CaseStore {
        &self.store
    }

    pub fn index(&self) -> &dyn SearchIndex {
        self.index.as_ref()
    }

    pub fn parser(&self) -> &CaseParser {
        &self.parser
    }

    /// Release the store connection
    pub fn close(self) -> Result<()> {
        self.store.close()
    }

    // ========================================================================
    // File operations
    // ========================================================================

    /// Replace the cases of one file with what it currently defines.
    ///
    /// A file that no longer exists is handled as a deletion.
    pub fn update(&mut self, path: &Path) -> Result<FileSyncStats> {
        let mut stats = self.commit_update(path)?;
        self.finish(&mut stats)?;
        Ok(stats)
    }

    /// Remove every case of one file
    pub fn delete(&mut self, path: &Path) -> Result<FileSyncStats> {
        let mut stats = self.commit_delete(&to_forward_slashes(path), Instant::now())?;
        self.finish(&mut stats)?;
        Ok(stats)
    }

    /// Move cases from `from` to `to` in one transaction.
    ///
    /// `to` is parsed only if its file name follows the test file
    /// convention; the rows of `from` are removed either way. Like
    /// [`update`](Self::update), this does not look at ignored directories:
    /// callers only pass paths below the root that are already filtered.
    pub fn relocate(&mut self, from: &Path, to: &Path) -> Result<FileSyncStats> {
        let started = Instant::now();
        let from_key = to_forward_slashes(from);
        let to_key = to_forward_slashes(to);
        if from_key == to_key {
            return self.update(to);
        }

        let to_matches = to
            .file_name()
            .is_some_and(|name| self.parser.rules().is_case_file_name(&name.to_string_lossy()));
        let cases = if to_matches {
            match self.read_source(to) {
                Ok(bytes) => self.parser.extract(&to_key, &bytes),
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => {
                    // The source is gone regardless of whether the target is readable
                    self.delete(from)?;
                    return Err(e);
                }
            }
        } else {
            Vec::new()
        };

        let mut stats = FileSyncStats::new(SyncAction::Moved, to_key.clone());
        stats.previous_path = Some(from_key.clone());
        {
            let txn = self.store.begin()?;
            stats.cases_removed = txn.delete_file(&from_key)?;
            txn.queue_mirror(&from_key)?;
            if to_matches {
                stats.cases_removed += txn.delete_file(&to_key)?;
                stats.cases_added = txn.insert_cases(&cases)?;
                txn.queue_mirror(&to_key)?;
            }
            txn.commit()?;
        }

        self.mirror(&from_key)?;
        if to_matches {
            self.mirror(&to_key)?;
        }
        stats.mirrored = true;
        stats.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "[SYNC] Moved {} -> {} ({} cases)",
            from_key,
            to_key,
            stats.cases_added
        );
        Ok(stats)
    }

    // ========================================================================
    // Whole-tree operations
    // ========================================================================

    /// Wipe both stores and re-index every test file under `root`.
    ///
    /// The index is cleared first; if that fails the store is left intact.
    pub fn rescan(&mut self, root: &Path) -> Result<ScanStats> {
        tracing::info!("[SYNC] Full rescan of {}", root.display());
        self.index.delete_all()?;
        self.store.clear_all()?;
        let files = collect_case_files(root, self.parser.rules())?;
        Ok(self.update_all(&files))
    }

    /// Update every file in order, continuing past per-file failures.
    ///
    /// After the first index failure the remaining files are committed
    /// without mirroring and stay queued in the outbox.
    pub fn update_all(&mut self, files: &[PathBuf]) -> ScanStats {
        let started = Instant::now();
        let mut stats = ScanStats::default();
        let mut index_down = false;

        for path in files {
            stats.files_scanned += 1;
            let mut file_stats = match self.commit_update(path) {
                Ok(s) => s,
                Err(e) => {
                    stats.files_failed += 1;
                    tracing::error!("[SYNC] Failed to index {}: {}", path.display(), e);
                    continue;
                }
            };
            stats.cases_indexed += file_stats.cases_added;

            if index_down {
                stats.mirror_deferred += 1;
                continue;
            }
            if let Err(e) = self.finish(&mut file_stats) {
                index_down = true;
                stats.mirror_deferred += 1;
                tracing::error!(
                    "[SYNC] Index unavailable ({}); remaining files stay queued for reconcile",
                    e
                );
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        stats
    }

    /// Delete the rows of stored files that are not in `present`
    pub fn prune_missing(&mut self, present: &[PathBuf]) -> Result<usize> {
        let present: HashSet<String> = present.iter().map(|p| to_forward_slashes(p)).collect();
        let mut pruned = 0;
        for stored in self.store.file_paths()? {
            if present.contains(&stored) {
                continue;
            }
            match self.delete(Path::new(&stored)) {
                Ok(_) => pruned += 1,
                Err(e) => tracing::error!("[SYNC] Failed to prune {}: {}", stored, e),
            }
        }
        Ok(pruned)
    }

    /// Replay every outbox entry from the committed rows.
    ///
    /// Stops at the first failure; the rest stays queued.
    pub fn reconcile(&mut self) -> Result<ReconcileStats> {
        let pending = self.store.pending_paths()?;
        let mut stats = ReconcileStats::default();

        for (done, file_path) in pending.iter().enumerate() {
            if let Err(e) = self.mirror(file_path) {
                stats.remaining = pending.len() - done;
                stats.error = Some(e.to_string());
                tracing::warn!(
                    "[SYNC] Reconcile stopped at {} with {} pending: {}",
                    file_path,
                    stats.remaining,
                    e
                );
                return Ok(stats);
            }
            stats.replayed += 1;
        }

        if stats.replayed > 0 {
            tracing::info!("[SYNC] Reconciled {} files", stats.replayed);
        }
        Ok(stats)
    }

    /// Clear the index and re-add every stored case
    pub fn rebuild_index(&mut self) -> Result<usize> {
        self.index.delete_all()?;
        let docs: Vec<CaseDocument> = self
            .store
            .all_cases()?
            .iter()
            .map(TestCase::to_document)
            .collect();
        for batch in docs.chunks(REBUILD_BATCH) {
            self.index.add_or_replace(batch)?;
        }
        self.store.clear_outbox()?;
        tracing::info!("[SYNC] Rebuilt index with {} documents", docs.len());
        Ok(docs.len())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Read, parse and commit the rows of one file, without touching the index
    fn commit_update(&mut self, path: &Path) -> Result<FileSyncStats> {
        let started = Instant::now();
        let file_path = to_forward_slashes(path);

        let bytes = match self.read_source(path) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                tracing::debug!("[SYNC] {} vanished before processing", file_path);
                return self.commit_delete(&file_path, started);
            }
            Err(e) => return Err(e),
        };
        let cases = self.parser.extract(&file_path, &bytes);

        let mut stats = FileSyncStats::new(SyncAction::Updated, file_path.clone());
        let txn = self.store.begin()?;
        stats.cases_removed = txn.delete_file(&file_path)?;
        stats.cases_added = txn.insert_cases(&cases)?;
        txn.queue_mirror(&file_path)?;
        txn.commit()?;

        stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }

    fn commit_delete(&mut self, file_path: &str, started: Instant) -> Result<FileSyncStats> {
        let mut stats = FileSyncStats::new(SyncAction::Deleted, file_path.to_string());
        let txn = self.store.begin()?;
        stats.cases_removed = txn.delete_file(file_path)?;
        txn.queue_mirror(file_path)?;
        txn.commit()?;
        stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Mirror a committed change and log it
    fn finish(&mut self, stats: &mut FileSyncStats) -> Result<()> {
        self.mirror(&stats.file_path)?;
        stats.mirrored = true;
        match stats.action {
            SyncAction::Deleted => tracing::info!(
                "[SYNC] Deleted {} ({} cases)",
                stats.file_path,
                stats.cases_removed
            ),
            _ => tracing::info!(
                "[SYNC] Updated {}: {} cases (was {})",
                stats.file_path,
                stats.cases_added,
                stats.cases_removed
            ),
        }
        Ok(())
    }

    /// Make the index hold exactly the stored rows of `file_path`, then
    /// drop its outbox entry
    fn mirror(&mut self, file_path: &str) -> Result<()> {
        let docs: Vec<CaseDocument> = self
            .store
            .cases_for_file(file_path)?
            .iter()
            .map(TestCase::to_document)
            .collect();

        self.index
            .delete_where(&IndexFilter::FilePath(file_path.to_string()))?;
        if !docs.is_empty() {
            self.index.add_or_replace(&docs)?;
        }
        self.store.clear_pending(file_path)?;
        tracing::debug!("[INDEX] Mirrored {} ({} documents)", file_path, docs.len());
        Ok(())
    }

    /// Read a source file, retrying while it is held by another process
    fn read_source(&self, path: &Path) -> Result<Vec<u8>> {
        let label = format!("read {}", path.display());
        retry_with_policy(&self.fs_retry, &label, || Ok((self.reader)(path)?)).map_err(|e| {
            if retry::exhausted(&e) {
                IndexerError::FileUnavailable {
                    path: path.to_path_buf(),
                    attempts: self.fs_retry.max_attempts,
                    message: e.to_string(),
                }
            } else {
                e
            }
        })
    }
}
