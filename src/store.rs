//! Relational store for test cases
//!
//! SQLite holds the authoritative copy of every indexed case plus a small
//! outbox of files whose rows have not yet been mirrored to the search
//! index. Both tables are written in one transaction per file, so a crash
//! between the commit and the index call leaves a replayable record.
//!
//! ```text
//! test_cases(id, project_name, project_description, case_name,
//!            case_description, file_path, case_code,
//!            UNIQUE(project_name, case_name, file_path))
//! index_outbox(file_path PRIMARY KEY, queued_at)
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::error::Result;
use crate::schema::TestCase;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS test_cases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_name TEXT NOT NULL,
    project_description TEXT,
    case_name TEXT NOT NULL,
    case_description TEXT,
    file_path TEXT NOT NULL,
    case_code TEXT NOT NULL,
    UNIQUE(project_name, case_name, file_path)
);
CREATE INDEX IF NOT EXISTS idx_test_cases_file_path ON test_cases(file_path);
CREATE TABLE IF NOT EXISTS index_outbox (
    file_path TEXT PRIMARY KEY,
    queued_at TEXT NOT NULL
);
";

const CASE_COLUMNS: &str =
    "project_name, project_description, case_name, case_description, file_path, case_code";

/// SQLite-backed test case store
pub struct CaseStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl CaseStore {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("[STORE] Opened {}", path.display());
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path: None })
    }

    /// Database file, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create the tables; with `recreate`, drop them first.
    ///
    /// Recreating destroys every stored case and pending outbox entry.
    pub fn setup(&mut self, recreate: bool) -> Result<()> {
        if recreate {
            tracing::warn!("[STORE] Dropping and recreating test_cases");
            self.conn.execute_batch(
                "DROP TABLE IF EXISTS test_cases; DROP TABLE IF EXISTS index_outbox;",
            )?;
        }
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Start a per-file transaction; dropping it without commit rolls back
    pub fn begin(&mut self) -> Result<CaseTxn<'_>> {
        Ok(CaseTxn {
            tx: self.conn.transaction()?,
        })
    }

    /// Remove every case and every outbox entry
    pub fn clear_all(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM test_cases", [])?;
        tx.execute("DELETE FROM index_outbox", [])?;
        tx.commit()?;
        tracing::info!("[STORE] Cleared {} rows", removed);
        Ok(())
    }

    /// Cases stored for one file, in insertion order
    pub fn cases_for_file(&self, file_path: &str) -> Result<Vec<TestCase>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM test_cases WHERE file_path = ?1 ORDER BY id",
            CASE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![file_path], row_to_case)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Every stored case, ordered by file then insertion
    pub fn all_cases(&self) -> Result<Vec<TestCase>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM test_cases ORDER BY file_path, id",
            CASE_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_case)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Distinct file paths that own at least one case
    pub fn file_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT file_path FROM test_cases ORDER BY file_path")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM test_cases", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Whether any stored file path starts with `prefix`
    pub fn has_files_under(&self, prefix: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM test_cases WHERE substr(file_path, 1, length(?1)) = ?1 LIMIT 1",
                params![prefix],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Files whose rows still need mirroring, oldest first
    pub fn pending_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT file_path FROM index_outbox ORDER BY queued_at, file_path")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Mark a file as mirrored
    pub fn clear_pending(&self, file_path: &str) -> Result<()> {
        self.conn
            .prepare_cached("DELETE FROM index_outbox WHERE file_path = ?1")?
            .execute(params![file_path])?;
        Ok(())
    }

    pub fn clear_outbox(&self) -> Result<()> {
        self.conn.execute("DELETE FROM index_outbox", [])?;
        Ok(())
    }

    /// Close the connection, surfacing any error from SQLite
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }
}

/// One file's worth of row changes
pub struct CaseTxn<'a> {
    tx: Transaction<'a>,
}

impl CaseTxn<'_> {
    /// Delete every row of `file_path`; returns the number removed
    pub fn delete_file(&self, file_path: &str) -> Result<usize> {
        let n = self
            .tx
            .prepare_cached("DELETE FROM test_cases WHERE file_path = ?1")?
            .execute(params![file_path])?;
        Ok(n)
    }

    /// Insert cases; a uniqueness violation surfaces as a constraint error
    pub fn insert_cases(&self, cases: &[TestCase]) -> Result<usize> {
        let mut stmt = self.tx.prepare_cached(&format!(
            "INSERT INTO test_cases ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            CASE_COLUMNS
        ))?;
        for case in cases {
            stmt.execute(params![
                case.project_name,
                case.project_description,
                case.case_name,
                case.case_description,
                case.file_path,
                case.case_code,
            ])?;
        }
        Ok(cases.len())
    }

    /// Record that `file_path` must be mirrored to the index
    pub fn queue_mirror(&self, file_path: &str) -> Result<()> {
        self.tx
            .prepare_cached(
                "INSERT INTO index_outbox (file_path, queued_at) VALUES (?1, ?2)
                 ON CONFLICT(file_path) DO UPDATE SET queued_at = excluded.queued_at",
            )?
            .execute(params![file_path, chrono::Utc::now().to_rfc3339()])?;
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn row_to_case(row: &Row<'_>) -> rusqlite::Result<TestCase> {
    Ok(TestCase {
        project_name: row.get(0)?,
        project_description: row.get(1)?,
        case_name: row.get(2)?,
        case_description: row.get(3)?,
        file_path: row.get(4)?,
        case_code: row.get(5)?,
    })
}
