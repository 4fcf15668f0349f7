//! Sync events for downstream consumers
//!
//! With `watch --events`, every processed change is written to stdout as one
//! JSON object per line (JSON Lines):
//!
//! ```json
//! {"type":"file_synced","action":"updated","file_path":"suite/p/test_a.py",...}
//! ```
//!
//! # Event Types
//!
//! - `file_synced` - one file was updated, deleted or moved
//! - `rescan_completed` - a structural change forced a full rescan
//! - `reconcile_completed` - outbox entries were replayed to the index

use serde::Serialize;
use std::io::{self, Write};

use super::coordinator::{FileSyncStats, ReconcileStats, ScanStats};

/// Event emitter for sending JSON events to stdout
#[derive(Debug, Clone, Copy)]
pub struct EventEmitter {
    enabled: bool,
}

impl EventEmitter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emit an event to stdout as JSON
    pub fn emit<E: SyncEvent>(&self, event: &E) {
        if !self.enabled {
            return;
        }
        if let Some(line) = render(event) {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            // Consumer may have gone away
            let _ = writeln!(handle, "{}", line);
            let _ = handle.flush();
        }
    }
}

/// One JSON line with the `type` tag first
pub fn render<E: SyncEvent>(event: &E) -> Option<String> {
    let wrapper = EventWrapper {
        event_type: E::event_type(),
        payload: event,
    };
    serde_json::to_string(&wrapper).ok()
}

/// Wrapper for events with type field
#[derive(Serialize)]
struct EventWrapper<'a, P: Serialize> {
    #[serde(rename = "type")]
    event_type: &'static str,
    #[serde(flatten)]
    payload: &'a P,
}

/// Trait for sync events
pub trait SyncEvent: Serialize {
    fn event_type() -> &'static str;
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ============================================================================
// Event Types
// ============================================================================

/// Emitted after a file-level change was applied
#[derive(Debug, Clone, Serialize)]
pub struct FileSyncedEvent {
    #[serde(flatten)]
    pub stats: FileSyncStats,
    pub timestamp: String,
}

impl SyncEvent for FileSyncedEvent {
    fn event_type() -> &'static str {
        "file_synced"
    }
}

impl From<&FileSyncStats> for FileSyncedEvent {
    fn from(stats: &FileSyncStats) -> Self {
        Self {
            stats: stats.clone(),
            timestamp: now(),
        }
    }
}

/// Emitted after a full rescan
#[derive(Debug, Clone, Serialize)]
pub struct RescanCompletedEvent {
    /// What triggered the rescan
    pub reason: String,
    /// Queued events the rescan superseded
    pub events_superseded: usize,
    #[serde(flatten)]
    pub stats: ScanStats,
    pub timestamp: String,
}

impl SyncEvent for RescanCompletedEvent {
    fn event_type() -> &'static str {
        "rescan_completed"
    }
}

impl RescanCompletedEvent {
    pub fn new(reason: &str, events_superseded: usize, stats: &ScanStats) -> Self {
        Self {
            reason: reason.to_string(),
            events_superseded,
            stats: stats.clone(),
            timestamp: now(),
        }
    }
}

/// Emitted after outbox entries were replayed
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileCompletedEvent {
    #[serde(flatten)]
    pub stats: ReconcileStats,
    pub timestamp: String,
}

impl SyncEvent for ReconcileCompletedEvent {
    fn event_type() -> &'static str {
        "reconcile_completed"
    }
}

impl From<&ReconcileStats> for ReconcileCompletedEvent {
    fn from(stats: &ReconcileStats) -> Self {
        Self {
            stats: stats.clone(),
            timestamp: now(),
        }
    }
}
