//! In-process search index
//!
//! Keeps documents in a map keyed by id. Cloning shares the same documents,
//! so a test can hand one clone to the coordinator and inspect another.
//! `fail_next` makes the next calls fail with a transient error, which is
//! how tests exercise the retry and outbox paths without a network.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{IndexFilter, SearchIndex};
use crate::error::{IndexerError, Result};
use crate::schema::CaseDocument;

#[derive(Debug, Default)]
struct MemoryState {
    docs: BTreeMap<String, CaseDocument>,
    failures_left: u32,
    ready: bool,
}

/// Shared in-memory index handle
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with a transient error
    pub fn fail_next(&self, n: u32) {
        self.state.lock().failures_left = n;
    }

    /// Copy of every document, ordered by id
    pub fn snapshot(&self) -> Vec<CaseDocument> {
        self.state.lock().docs.values().cloned().collect()
    }

    /// Documents whose `file_path` equals `file_path`, ordered by id
    pub fn documents_for_file(&self, file_path: &str) -> Vec<CaseDocument> {
        self.state
            .lock()
            .docs
            .values()
            .filter(|d| d.file_path == file_path)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    fn with_state<T>(&self, op: impl FnOnce(&mut MemoryState) -> T) -> Result<T> {
        let mut state = self.state.lock();
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(IndexerError::Index {
                message: "injected failure".into(),
                transient: true,
            });
        }
        Ok(op(&mut state))
    }
}

impl SearchIndex for MemoryIndex {
    fn ensure_ready(&self) -> Result<()> {
        self.with_state(|s| s.ready = true)
    }

    fn delete_where(&self, filter: &IndexFilter) -> Result<()> {
        self.with_state(|s| s.docs.retain(|_, d| !filter.matches(d)))
    }

    fn delete_all(&self) -> Result<()> {
        self.with_state(|s| s.docs.clear())
    }

    fn add_or_replace(&self, docs: &[CaseDocument]) -> Result<()> {
        self.with_state(|s| {
            for doc in docs {
                s.docs.insert(doc.id.clone(), doc.clone());
            }
        })
    }

    /// Case-insensitive substring match over the text fields
    fn search(&self, query: &str, limit: usize) -> Result<Value> {
        let needle = query.to_lowercase();
        self.with_state(|s| {
            let hits: Vec<Value> = s
                .docs
                .values()
                .filter(|d| {
                    needle.is_empty()
                        || [
                            Some(&d.case_name),
                            Some(&d.project_name),
                            d.case_description.as_ref(),
                            d.project_description.as_ref(),
                            Some(&d.case_code),
                        ]
                        .into_iter()
                        .flatten()
                        .any(|field| field.to_lowercase().contains(&needle))
                })
                .take(limit)
                .map(|d| json!(d))
                .collect();
            let total = hits.len();
            json!({
                "hits": hits,
                "query": query,
                "limit": limit,
                "estimatedTotalHits": total,
            })
        })
    }

    fn documents(&self, limit: usize) -> Result<Vec<Value>> {
        self.with_state(|s| s.docs.values().take(limit).map(|d| json!(d)).collect())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
