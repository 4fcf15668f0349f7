//! Search index backends
//!
//! The search index is a best-effort mirror of the relational store. It is
//! reached through the [`SearchIndex`] trait so that the coordinator does not
//! care whether it talks to Meilisearch over HTTP or to an in-process map:
//!
//! - [`MeiliIndex`]: Meilisearch REST API, blocking client
//! - [`MemoryIndex`]: in-process documents with fault injection, for tests
//! - [`RetryingIndex`]: wraps any backend with a [`RetryPolicy`]
//!
//! Every document carries `case_name` and `file_path` as filterable
//! attributes; deletions are expressed as an [`IndexFilter`].

pub mod meili;
pub mod memory;

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

use crate::error::Result;
use crate::retry::{retry_with_policy, RetryPolicy};
use crate::schema::CaseDocument;

pub use meili::MeiliIndex;
pub use memory::MemoryIndex;

/// Attributes every backend must be able to filter on
pub const FILTERABLE_ATTRIBUTES: [&str; 2] = ["case_name", "file_path"];

/// Documents scanned when listing projects
pub const PROJECT_SCAN_LIMIT: usize = 1000;

/// Operations the coordinator and the query commands need from an index
pub trait SearchIndex: Send {
    /// Create the index if absent and declare filterable attributes
    fn ensure_ready(&self) -> Result<()>;

    /// Delete every document matching `filter`
    fn delete_where(&self, filter: &IndexFilter) -> Result<()>;

    /// Delete every document
    fn delete_all(&self) -> Result<()>;

    /// Insert documents, replacing any with the same id
    fn add_or_replace(&self, docs: &[CaseDocument]) -> Result<()>;

    /// Full-text search; returns the backend's native response unmodified
    fn search(&self, query: &str, limit: usize) -> Result<Value>;

    /// Up to `limit` raw documents
    fn documents(&self, limit: usize) -> Result<Vec<Value>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Equality filter on one filterable attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexFilter {
    FilePath(String),
    CaseName(String),
}

impl IndexFilter {
    pub fn attribute(&self) -> &'static str {
        match self {
            Self::FilePath(_) => "file_path",
            Self::CaseName(_) => "case_name",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::FilePath(v) | Self::CaseName(v) => v,
        }
    }

    /// Filter expression in Meilisearch syntax, value quoted and escaped
    pub fn expression(&self) -> String {
        let escaped = self.value().replace('\\', "\\\\").replace('"', "\\\"");
        format!("{} = \"{}\"", self.attribute(), escaped)
    }

    pub fn matches(&self, doc: &CaseDocument) -> bool {
        match self {
            Self::FilePath(v) => doc.file_path == *v,
            Self::CaseName(v) => doc.case_name == *v,
        }
    }
}

impl fmt::Display for IndexFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

/// Distinct project names among the first [`PROJECT_SCAN_LIMIT`] documents, sorted
pub fn list_projects(index: &dyn SearchIndex) -> Result<Vec<String>> {
    let docs = index.documents(PROJECT_SCAN_LIMIT)?;
    let projects: BTreeSet<String> = docs
        .iter()
        .filter_map(|d| d.get("project_name").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    Ok(projects.into_iter().collect())
}

// ============================================================================
// Retry decorator
// ============================================================================

/// Applies a retry policy to every call of the wrapped backend
pub struct RetryingIndex {
    inner: Box<dyn SearchIndex>,
    policy: RetryPolicy,
}

impl RetryingIndex {
    pub fn new(inner: Box<dyn SearchIndex>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl SearchIndex for RetryingIndex {
    fn ensure_ready(&self) -> Result<()> {
        retry_with_policy(&self.policy, "index setup", || self.inner.ensure_ready())
    }

    fn delete_where(&self, filter: &IndexFilter) -> Result<()> {
        let label = format!("index delete {}", filter);
        retry_with_policy(&self.policy, &label, || self.inner.delete_where(filter))
    }

    fn delete_all(&self) -> Result<()> {
        retry_with_policy(&self.policy, "index delete all", || self.inner.delete_all())
    }

    fn add_or_replace(&self, docs: &[CaseDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        retry_with_policy(&self.policy, "index add", || self.inner.add_or_replace(docs))
    }

    fn search(&self, query: &str, limit: usize) -> Result<Value> {
        retry_with_policy(&self.policy, "index search", || self.inner.search(query, limit))
    }

    fn documents(&self, limit: usize) -> Result<Vec<Value>> {
        retry_with_policy(&self.policy, "index documents", || self.inner.documents(limit))
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}
