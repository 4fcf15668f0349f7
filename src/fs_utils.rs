//! Cross-platform path helpers
//!
//! Every path that reaches the stores goes through these helpers so that the
//! watcher, the scanner and one-shot commands agree on a single string
//! identity per file:
//! - `normalize_path`: Strips the Windows `\\?\` prefix from canonicalized paths
//! - `to_forward_slashes`: Renders a path with `/` separators (the `file_path` key)
//! - `RootPaths`: Rebases absolute watcher paths onto the configured root
//! - `default_config_path`: Platform-appropriate config file location

use std::path::{Path, PathBuf};

/// Normalize Windows paths by removing the `\\?\` prefix if present.
///
/// On Windows, `Path::canonicalize()` returns paths with the extended-length path prefix
/// (`\\?\C:\...`), which would otherwise never compare equal to the paths the
/// watcher reports. This is a no-op on Unix.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use case_indexer::fs_utils::normalize_path;
///
/// let path = PathBuf::from("/home/user/repo");
/// assert_eq!(normalize_path(&path), path);
/// ```
pub fn normalize_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let s = path.to_string_lossy();
        // Handle UNC paths: \\?\UNC\server\share -> \\server\share
        if let Some(stripped) = s.strip_prefix(r"\\?\UNC\") {
            return PathBuf::from(format!(r"\\{}", stripped));
        }
        // Handle local paths: \\?\C:\path -> C:\path
        if let Some(stripped) = s.strip_prefix(r"\\?\") {
            return PathBuf::from(stripped);
        }
    }
    path.to_path_buf()
}

/// Render a path with forward-slash separators.
///
/// This string is the `file_path` stored in both the relational table and
/// the search index, and the input to document id hashing.
///
/// ```
/// use std::path::Path;
/// use case_indexer::fs_utils::to_forward_slashes;
///
/// assert_eq!(to_forward_slashes(Path::new("tests/a/test_x.py")), "tests/a/test_x.py");
/// ```
pub fn to_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// The watched root as configured, plus its canonical form.
///
/// Scans produce `root.join(relative)` paths, while some notify backends
/// report absolute paths. `rebase` maps the latter back onto the configured
/// root so both routes produce the same key.
#[derive(Debug, Clone)]
pub struct RootPaths {
    root: PathBuf,
    canonical: PathBuf,
}

impl RootPaths {
    /// Build from the configured root. Falls back to the root itself when it
    /// cannot be canonicalized (e.g. it does not exist yet).
    pub fn new(root: &Path) -> Self {
        let canonical = root
            .canonicalize()
            .map(|p| normalize_path(&p))
            .unwrap_or_else(|_| root.to_path_buf());
        Self {
            root: root.to_path_buf(),
            canonical,
        }
    }

    /// The root exactly as configured
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Express `path` relative to the configured root string
    pub fn rebase(&self, path: &Path) -> PathBuf {
        if path.starts_with(&self.root) {
            return path.to_path_buf();
        }
        let path = normalize_path(path);
        match path.strip_prefix(&self.canonical) {
            Ok(rel) if rel.as_os_str().is_empty() => self.root.clone(),
            Ok(rel) => self.root.join(rel),
            Err(_) => path,
        }
    }
}

/// Get the platform-appropriate default config file path.
///
/// - **Windows**: `%APPDATA%\case-indexer\config.toml`
/// - **Unix**: `$XDG_CONFIG_HOME/case-indexer/config.toml` or `~/.config/case-indexer/config.toml`
/// - **Fallback**: `./case-indexer.toml`
pub fn default_config_path() -> PathBuf {
    if let Some(config) = dirs::config_dir() {
        return config.join("case-indexer").join("config.toml");
    }
    PathBuf::from("case-indexer.toml")
}
