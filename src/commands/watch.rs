//! Watch command handler
//!
//! Keeps the store and the index in sync with the tree until Ctrl-C:
//!
//! ```text
//! setup ─> reconcile ─> start watcher ─> initial scan ─> worker thread
//!                           │                                  ▲
//!                           └──── change events (queued) ──────┘
//! ```
//!
//! The watcher starts before the initial scan so that changes made while
//! scanning are queued rather than lost. The worker applies them afterwards.
//! On Ctrl-C the worker's `running` flag is cleared and the watcher stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::cli::{OutputFormat, WatchArgs};
use crate::commands::scan::format_scan;
use crate::commands::{apply_root, open_coordinator, CommandContext};
use crate::error::{IndexerError, Result};
use crate::sync::{
    initial_scan, EventEmitter, FileWatcher, RescanCompletedEvent, SyncCoordinator, SyncWorker,
};

const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Run the watch command
pub fn run_watch(args: &WatchArgs, ctx: &CommandContext) -> Result<String> {
    let mut config = ctx.load_config()?;
    args.store.apply(&mut config);
    apply_root(&mut config, args.root.as_deref());
    let recreate = args.recreate || config.recreate;
    let root = config.watch.root.clone();
    let emitter = EventEmitter::new(args.events);

    tracing::info!(
        "Starting case-indexer v{} on {}",
        env!("CARGO_PKG_VERSION"),
        root.display()
    );

    let mut coordinator = open_coordinator(&config)?;
    coordinator.setup(recreate)?;

    let replay = coordinator.reconcile()?;
    if replay.replayed > 0 || replay.remaining > 0 {
        tracing::info!(
            "[WATCH] Replayed {} pending files, {} remaining",
            replay.replayed,
            replay.remaining
        );
    }

    let (tx, rx) = mpsc::channel();
    let watcher = FileWatcher::new(&root, coordinator.parser().rules().clone());
    let mut watcher_handle = watcher.start(tx)?;
    tracing::info!("[WATCH] Watching {}", root.display());

    let mut summary = String::new();
    if args.no_initial_scan {
        tracing::info!("[WATCH] Initial scan skipped");
    } else {
        let stats = initial_scan(&mut coordinator, &root)?;
        emitter.emit(&RescanCompletedEvent::new("initial scan", 0, &stats));
        if ctx.format == OutputFormat::Text {
            summary = format_scan(&root.display().to_string(), &stats);
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let worker = SyncWorker::new(coordinator, &root, emitter, config.reconcile_interval());
    let worker_thread =
        worker
            .spawn(rx, Arc::clone(&running))
            .map_err(|e| IndexerError::Watch {
                message: format!("Failed to start sync worker: {}", e),
            })?;

    wait_for_shutdown(&worker_thread)?;

    tracing::info!("[WATCH] Shutting down");
    // The worker stops after the event in hand; anything still queued is
    // picked up by the next initial scan
    running.store(false, Ordering::SeqCst);
    watcher_handle.stop();
    let coordinator = worker_thread.join().map_err(|_| IndexerError::Watch {
        message: "Sync worker panicked".to_string(),
    })?;
    coordinator.close()?;

    if summary.is_empty() {
        Ok(String::new())
    } else {
        Ok(summary + "Stopped.\n")
    }
}

/// Block until Ctrl-C, or until the worker exits on its own
fn wait_for_shutdown(worker: &JoinHandle<SyncCoordinator>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| IndexerError::ConfigError {
            message: format!("Failed to create tokio runtime: {}", e),
        })?;

    runtime.block_on(async {
        let mut poll = tokio::time::interval(SHUTDOWN_POLL);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                signal = &mut ctrl_c => {
                    if let Err(e) = signal {
                        tracing::warn!("[WATCH] Signal handler failed: {}", e);
                    }
                    break;
                }
                _ = poll.tick() => {
                    if worker.is_finished() {
                        tracing::warn!("[WATCH] Sync worker exited");
                        break;
                    }
                }
            }
        }
    });
    Ok(())
}
