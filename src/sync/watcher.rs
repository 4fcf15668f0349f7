//! Filesystem watcher feeding the sync worker
//!
//! Uses the `notify` crate to watch the test root recursively. Raw events are
//! classified into [`ChangeEvent`]s on a dedicated thread and queued for the
//! worker.
//!
//! ```text
//! ┌─────────────┐  notify::Event  ┌────────────┐  ChangeEvent  ┌────────────┐
//! │   notify    │────────────────>│  classify  │──────────────>│ SyncWorker │
//! │   watcher   │                 │  (thread)  │               │   queue    │
//! └─────────────┘                 └────────────┘               └────────────┘
//! ```
//!
//! | Raw event                         | Classified as                     |
//! |-----------------------------------|-----------------------------------|
//! | file created / modified           | `FileChanged` (test files only)   |
//! | file removed                      | `FileRemoved` (test files only)   |
//! | rename with both paths            | `FileMoved` (destination matches) |
//! | rename of a test file elsewhere   | `FileRemoved`                     |
//! | rename/remove of unknown kind     | `PathRemoved`                     |
//! | directory created/removed/moved   | `Rescan`                          |
//! | directory modified                | `Rescan`                          |
//! | backend overflow (rescan flag)    | `Rescan`                          |

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};

use crate::error::Result;
use crate::fs_utils::RootPaths;
use crate::parsing::MatchRules;

use super::ChangeEvent;

/// Recursive watcher over the test root
pub struct FileWatcher {
    roots: RootPaths,
    rules: MatchRules,
    running: Arc<AtomicBool>,
}

impl FileWatcher {
    pub fn new(root: &Path, rules: MatchRules) -> Self {
        Self {
            roots: RootPaths::new(root),
            rules,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if the watcher is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start watching; classified events are sent on `events`.
    ///
    /// The classifier thread exits, dropping `events`, when the handle is
    /// stopped or the receiving side goes away.
    pub fn start(&self, events: Sender<ChangeEvent>) -> Result<WatcherHandle> {
        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(raw_tx)?;
        watcher.watch(self.roots.root(), RecursiveMode::Recursive)?;
        tracing::info!("[WATCHER] Watching {}", self.roots.root().display());

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let roots = self.roots.clone();
        let rules = self.rules.clone();

        let thread = std::thread::Builder::new()
            .name("case-indexer-watcher".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match raw_rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(Ok(event)) => {
                            tracing::debug!(
                                "[WATCHER] Event kind: {:?}, paths: {:?}",
                                event.kind,
                                event.paths
                            );
                            for change in classify(&event, &roots, &rules) {
                                if events.send(change).is_err() {
                                    running.store(false, Ordering::SeqCst);
                                    break;
                                }
                            }
                        }
                        Ok(Err(e)) => {
                            tracing::error!("[WATCHER] Watcher error: {}", e);
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                // Keep the notify watcher alive until the thread exits
                drop(watcher);
                tracing::debug!("[WATCHER] Stopped");
            })?;

        Ok(WatcherHandle {
            running: Arc::clone(&self.running),
            thread: Some(thread),
        })
    }
}

/// Handle for controlling a running watcher
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Stop the watcher and wait for its thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Check if the watcher is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Turn one raw notify event into zero or more change events.
///
/// Paths are rebased onto the configured root. Anything under an ignored
/// directory is dropped. Several structural changes in one event collapse
/// into a single rescan.
pub fn classify(event: &Event, roots: &RootPaths, rules: &MatchRules) -> Vec<ChangeEvent> {
    if event.need_rescan() {
        return vec![ChangeEvent::rescan("watcher requested rescan")];
    }

    let filter = PathFilter { roots, rules };
    let mut changes = Vec::new();

    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            let from = roots.rebase(&event.paths[0]);
            let to = roots.rebase(&event.paths[1]);
            if filter.ignored(&from) && filter.ignored(&to) {
                return changes;
            }
            if to.is_dir() {
                changes.push(ChangeEvent::rescan("directory moved"));
            } else if filter.is_case_file(&to) {
                changes.push(ChangeEvent::FileMoved { from, to });
            } else if filter.is_case_file(&from) {
                // Renamed away from the convention or into an ignored directory
                changes.push(ChangeEvent::FileRemoved(from));
            } else if !filter.ignored(&from) {
                changes.push(ChangeEvent::PathRemoved(from));
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            for path in filter.visible(&event.paths) {
                if path.is_dir() {
                    changes.push(ChangeEvent::rescan("directory moved"));
                } else if path.exists() {
                    if filter.is_case_file(&path) {
                        changes.push(ChangeEvent::FileChanged(path));
                    }
                } else if filter.is_case_file(&path) {
                    changes.push(ChangeEvent::FileRemoved(path));
                } else {
                    changes.push(ChangeEvent::PathRemoved(path));
                }
            }
        }
        EventKind::Create(kind) => {
            for path in filter.visible(&event.paths) {
                if matches!(kind, CreateKind::Folder) || path.is_dir() {
                    changes.push(ChangeEvent::rescan("directory created"));
                } else if filter.is_case_file(&path) {
                    changes.push(ChangeEvent::FileChanged(path));
                }
            }
        }
        EventKind::Remove(kind) => {
            for path in filter.visible(&event.paths) {
                if matches!(kind, RemoveKind::Folder) {
                    changes.push(ChangeEvent::rescan("directory deleted"));
                } else if filter.is_case_file(&path) {
                    changes.push(ChangeEvent::FileRemoved(path));
                } else if matches!(kind, RemoveKind::Any | RemoveKind::Other) {
                    changes.push(ChangeEvent::PathRemoved(path));
                }
            }
        }
        EventKind::Modify(_) => {
            for path in filter.visible(&event.paths) {
                if path.is_dir() {
                    changes.push(ChangeEvent::rescan("directory modified"));
                } else if filter.is_case_file(&path) {
                    changes.push(ChangeEvent::FileChanged(path));
                }
            }
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }

    if let Some(rescan) = changes
        .iter()
        .find(|c| matches!(c, ChangeEvent::Rescan { .. }))
    {
        return vec![rescan.clone()];
    }
    changes
}

/// Applies the matching rules to paths relative to the watched root
struct PathFilter<'a> {
    roots: &'a RootPaths,
    rules: &'a MatchRules,
}

impl PathFilter<'_> {
    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(self.roots.root()).unwrap_or(path)
    }

    fn ignored(&self, path: &Path) -> bool {
        self.rules.is_ignored(self.relative(path))
    }

    fn is_case_file(&self, path: &Path) -> bool {
        self.rules.is_case_file(self.relative(path))
    }

    /// Rebased event paths outside ignored directories
    fn visible(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths
            .iter()
            .map(|p| self.roots.rebase(p))
            .filter(|p| !self.ignored(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, Flag, MetadataKind};
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        roots: RootPaths,
        rules: MatchRules,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("suite");
        fs::create_dir_all(root.join("proj")).unwrap();
        Fixture {
            roots: RootPaths::new(&root),
            root,
            rules: MatchRules::default(),
            _dir: dir,
        }
    }

    fn event(kind: EventKind, paths: &[&Path]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(p.to_path_buf()))
    }

    #[test]
    fn test_created_test_file_is_changed() {
        let f = fixture();
        let path = f.root.join("proj/test_a.py");
        fs::write(&path, "").unwrap();
        let changes = classify(
            &event(EventKind::Create(CreateKind::File), &[&path]),
            &f.roots,
            &f.rules,
        );
        assert_eq!(changes, vec![ChangeEvent::FileChanged(path)]);
    }

    #[test]
    fn test_non_matching_files_are_ignored() {
        let f = fixture();
        let path = f.root.join("proj/helper.py");
        fs::write(&path, "").unwrap();
        let kind = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        assert!(classify(&event(kind, &[&path]), &f.roots, &f.rules).is_empty());
    }

    #[test]
    fn test_ignored_directories_are_dropped() {
        let f = fixture();
        let cache = f.root.join("proj/__pycache__");
        fs::create_dir_all(&cache).unwrap();
        let changes = classify(
            &event(EventKind::Create(CreateKind::Folder), &[&cache]),
            &f.roots,
            &f.rules,
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn test_directory_changes_trigger_one_rescan() {
        let f = fixture();
        let a = f.root.join("a");
        let b = f.root.join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        let created = classify(
            &event(EventKind::Create(CreateKind::Folder), &[&a, &b]),
            &f.roots,
            &f.rules,
        );
        assert_eq!(created, vec![ChangeEvent::rescan("directory created")]);

        let removed = classify(
            &event(EventKind::Remove(RemoveKind::Folder), &[&f.root.join("gone")]),
            &f.roots,
            &f.rules,
        );
        assert_eq!(removed, vec![ChangeEvent::rescan("directory deleted")]);

        let touched = classify(
            &event(
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
                &[&a],
            ),
            &f.roots,
            &f.rules,
        );
        assert_eq!(touched, vec![ChangeEvent::rescan("directory modified")]);
    }

    #[test]
    fn test_rename_both_becomes_move() {
        let f = fixture();
        let from = f.root.join("proj/test_a.py");
        let to = f.root.join("proj/test_b.py");
        fs::write(&to, "").unwrap();
        let kind = EventKind::Modify(ModifyKind::Name(RenameMode::Both));
        let changes = classify(&event(kind, &[&from, &to]), &f.roots, &f.rules);
        assert_eq!(changes, vec![ChangeEvent::FileMoved { from, to }]);
    }

    #[test]
    fn test_atomic_save_into_test_file_is_a_move() {
        let f = fixture();
        let from = f.root.join("proj/.test_a.py.swp");
        let to = f.root.join("proj/test_a.py");
        fs::write(&to, "").unwrap();
        let kind = EventKind::Modify(ModifyKind::Name(RenameMode::Both));
        let changes = classify(&event(kind, &[&from, &to]), &f.roots, &f.rules);
        assert_eq!(changes, vec![ChangeEvent::FileMoved { from, to }]);
    }

    #[test]
    fn test_rename_away_from_convention_is_removal() {
        let f = fixture();
        let kind = || EventKind::Modify(ModifyKind::Name(RenameMode::Both));
        let from = f.root.join("proj/test_a.py");

        let backup = f.root.join("proj/test_a.py.bak");
        fs::write(&backup, "").unwrap();
        let changes = classify(&event(kind(), &[&from, &backup]), &f.roots, &f.rules);
        assert_eq!(changes, vec![ChangeEvent::FileRemoved(from.clone())]);

        let cached = f.root.join("proj/__pycache__/test_a.py");
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, "").unwrap();
        let changes = classify(&event(kind(), &[&from, &cached]), &f.roots, &f.rules);
        assert_eq!(changes, vec![ChangeEvent::FileRemoved(from)]);
    }

    #[test]
    fn test_root_inside_ignored_name_still_matches() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("venv/suite");
        fs::create_dir_all(root.join("proj")).unwrap();
        let roots = RootPaths::new(&root);
        let from = root.join("proj/test_a.py");
        let to = root.join("proj/test_b.py");
        fs::write(&to, "").unwrap();

        let kind = EventKind::Modify(ModifyKind::Name(RenameMode::Both));
        let changes = classify(&event(kind, &[&from, &to]), &roots, &MatchRules::default());
        assert_eq!(changes, vec![ChangeEvent::FileMoved { from, to }]);
    }

    #[test]
    fn test_directory_rename_triggers_rescan() {
        let f = fixture();
        let from = f.root.join("old_proj");
        let to = f.root.join("proj");
        let kind = EventKind::Modify(ModifyKind::Name(RenameMode::Both));
        let changes = classify(&event(kind, &[&from, &to]), &f.roots, &f.rules);
        assert_eq!(changes, vec![ChangeEvent::rescan("directory moved")]);
    }

    #[test]
    fn test_rename_from_unknown_path_is_path_removed() {
        let f = fixture();
        let rename_from = || EventKind::Modify(ModifyKind::Name(RenameMode::From));
        let gone = f.root.join("moved_away");
        let changes = classify(&event(rename_from(), &[&gone]), &f.roots, &f.rules);
        assert_eq!(changes, vec![ChangeEvent::PathRemoved(gone)]);

        let gone_file = f.root.join("proj/test_gone.py");
        let changes = classify(&event(rename_from(), &[&gone_file]), &f.roots, &f.rules);
        assert_eq!(changes, vec![ChangeEvent::FileRemoved(gone_file)]);
    }

    #[test]
    fn test_rescan_flag_wins() {
        let f = fixture();
        let e = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        assert_eq!(
            classify(&e, &f.roots, &f.rules),
            vec![ChangeEvent::rescan("watcher requested rescan")]
        );
    }

    #[test]
    fn test_absolute_paths_are_rebased_onto_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("suite");
        fs::create_dir_all(root.join("proj")).unwrap();
        let configured = root.join("proj").join("..");
        let roots = RootPaths::new(&configured);

        let absolute = root.canonicalize().unwrap().join("proj/test_a.py");
        fs::write(&absolute, "").unwrap();
        let changes = classify(
            &event(EventKind::Create(CreateKind::File), &[&absolute]),
            &roots,
            &MatchRules::default(),
        );
        assert_eq!(
            changes,
            vec![ChangeEvent::FileChanged(configured.join("proj/test_a.py"))]
        );
    }
}
