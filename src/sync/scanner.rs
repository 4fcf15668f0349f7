//! Whole-tree scanning
//!
//! Walks the watched root once to find every test file. Used for the initial
//! baseline before live watching starts and for structural rescans.
//! Gitignore rules are not applied: a test file is indexed whenever it is on
//! disk outside the configured ignore directories.

use std::io;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{IndexerError, Result};
use crate::parsing::MatchRules;

use super::coordinator::{ScanStats, SyncCoordinator};

/// Every test file under `root`, sorted, as `root.join(relative)` paths
pub fn collect_case_files(root: &Path, rules: &MatchRules) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(IndexerError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Watch root {} is not a directory", root.display()),
        )));
    }

    let ignore_dirs = rules.ignore_dirs.clone();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && entry.depth() > 0
                && ignore_dirs
                    .iter()
                    .any(|d| entry.file_name().to_string_lossy() == d.as_str()))
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("[SCAN] Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if rules.is_case_file_name(&entry.file_name().to_string_lossy()) {
            files.push(entry.into_path());
        }
    }

    tracing::debug!("[SCAN] Found {} test files under {}", files.len(), root.display());
    Ok(files)
}

/// Seed both stores from the tree before live events are applied.
///
/// Stored files that are no longer on disk are removed, then every test
/// file is re-indexed.
pub fn initial_scan(coordinator: &mut SyncCoordinator, root: &Path) -> Result<ScanStats> {
    tracing::info!("[SCAN] Initial scan of {}", root.display());
    let files = collect_case_files(root, coordinator.parser().rules())?;
    let pruned = coordinator.prune_missing(&files)?;
    let mut stats = coordinator.update_all(&files);
    stats.files_pruned = pruned;

    tracing::info!(
        "[SCAN] Indexed {} cases from {} files ({} failed, {} pruned) in {}ms",
        stats.cases_indexed,
        stats.files_scanned,
        stats.files_failed,
        stats.files_pruned,
        stats.duration_ms
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_collects_only_matching_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b/test_two.py");
        touch(dir.path(), "a/test_one.py");
        touch(dir.path(), "a/helper.py");
        touch(dir.path(), "a/test_data.json");
        touch(dir.path(), "a/__pycache__/test_one.py");
        touch(dir.path(), ".git/test_hook.py");

        let files = collect_case_files(dir.path(), &MatchRules::default()).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("a/test_one.py"),
                dir.path().join("b/test_two.py")
            ]
        );
    }

    #[test]
    fn test_gitignored_files_are_still_collected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "generated/\n").unwrap();
        touch(dir.path(), "generated/test_gen.py");
        let files = collect_case_files(dir.path(), &MatchRules::default()).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_case_files(&dir.path().join("nope"), &MatchRules::default());
        assert!(err.is_err());
    }
}
