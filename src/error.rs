//! Error types and exit codes for case-indexer

use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

/// Main error type for case-indexer operations
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "File {} still unavailable after {} attempts: {}",
        .path.display(),
        .attempts,
        .message
    )]
    FileUnavailable {
        path: PathBuf,
        attempts: u32,
        message: String,
    },

    #[error("Could not decode {path} as UTF-8 or {encoding}")]
    Decode { path: String, encoding: String },

    #[error("Failed to parse file: {message}")]
    ParseFailure { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Uniqueness constraint violated: {message}")]
    Constraint { message: String },

    #[error("Search index error: {message}")]
    Index { message: String, transient: bool },

    #[error("Watcher error: {message}")]
    Watch { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl IndexerError {
    /// Whether retrying the failed operation can reasonably succeed.
    ///
    /// Files that were just created are often still held open by the
    /// writing process, and the index backend may be briefly unreachable.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => {
                is_locked_by_writer(e)
                    || matches!(
                        e.kind(),
                        std::io::ErrorKind::PermissionDenied
                            | std::io::ErrorKind::WouldBlock
                            | std::io::ErrorKind::Interrupted
                            | std::io::ErrorKind::TimedOut
                    )
            }
            Self::Index { transient, .. } => *transient,
            _ => false,
        }
    }

    /// True when the error means the file no longer exists
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Convert error to a process exit code:
    /// - 1: IO error / file unavailable
    /// - 2: Configuration error
    /// - 3: Decode or parse failure
    /// - 4: Relational store error
    /// - 5: Search index error
    /// - 6: Watcher error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) | Self::FileUnavailable { .. } => ExitCode::from(1),
            Self::ConfigError { .. } => ExitCode::from(2),
            Self::Decode { .. } | Self::ParseFailure { .. } => ExitCode::from(3),
            Self::Store { .. } | Self::Constraint { .. } => ExitCode::from(4),
            Self::Index { .. } => ExitCode::from(5),
            Self::Watch { .. } => ExitCode::from(6),
        }
    }
}

impl From<rusqlite::Error> for IndexerError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Constraint {
                    message: err.to_string(),
                }
            }
            _ => Self::Store {
                message: err.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_connect()
            || err.is_timeout()
            || err
                .status()
                .map(|s| s.is_server_error() || s.as_u16() == 429)
                .unwrap_or(false);
        Self::Index {
            message: err.to_string(),
            transient,
        }
    }
}

impl From<notify::Error> for IndexerError {
    fn from(err: notify::Error) -> Self {
        Self::Watch {
            message: err.to_string(),
        }
    }
}

/// `ERROR_SHARING_VIOLATION` and `ERROR_LOCK_VIOLATION`
#[cfg(windows)]
const WINDOWS_LOCK_ERRORS: [i32; 2] = [32, 33];

/// Windows reports a file held open by its writer as a sharing or lock
/// violation rather than `PermissionDenied`
#[cfg(windows)]
fn is_locked_by_writer(e: &std::io::Error) -> bool {
    e.raw_os_error()
        .is_some_and(|code| WINDOWS_LOCK_ERRORS.contains(&code))
}

#[cfg(not(windows))]
fn is_locked_by_writer(_e: &std::io::Error) -> bool {
    false
}

/// Result type alias for case-indexer operations
pub type Result<T> = std::result::Result<T, IndexerError>;
