//! Scan command handlers - One-shot synchronization and index maintenance

use serde::Serialize;

use crate::cli::{OutputFormat, ScanArgs, StoreArgs};
use crate::commands::{apply_root, open_coordinator, CommandContext};
use crate::error::Result;
use crate::sync::{initial_scan, ReconcileStats, ScanStats};

#[derive(Serialize)]
struct ScanReport<'a> {
    root: String,
    recreated: bool,
    #[serde(flatten)]
    stats: &'a ScanStats,
}

/// Run the scan command
pub fn run_scan(args: &ScanArgs, ctx: &CommandContext) -> Result<String> {
    let mut config = ctx.load_config()?;
    args.store.apply(&mut config);
    apply_root(&mut config, args.root.as_deref());
    let recreate = args.recreate || config.recreate;

    let mut coordinator = open_coordinator(&config)?;
    coordinator.setup(recreate)?;
    let stats = initial_scan(&mut coordinator, &config.watch.root)?;
    coordinator.close()?;

    match ctx.format {
        OutputFormat::Json => ctx.to_json(&ScanReport {
            root: config.watch.root.display().to_string(),
            recreated: recreate,
            stats: &stats,
        }),
        OutputFormat::Text => Ok(format_scan(&config.watch.root.display().to_string(), &stats)),
    }
}

/// Human-readable summary of a scan
pub fn format_scan(root: &str, stats: &ScanStats) -> String {
    let mut output = format!(
        "Scanned {} files under {} ({} failed, {} pruned)\n",
        stats.files_scanned, root, stats.files_failed, stats.files_pruned
    );
    output.push_str(&format!(
        "Indexed {} cases in {}ms\n",
        stats.cases_indexed, stats.duration_ms
    ));
    if stats.mirror_deferred > 0 {
        output.push_str(&format!(
            "Search index unavailable: {} files pending, run `case-indexer reconcile` later\n",
            stats.mirror_deferred
        ));
    }
    output
}

/// Run the reconcile command
pub fn run_reconcile(args: &StoreArgs, ctx: &CommandContext) -> Result<String> {
    let mut config = ctx.load_config()?;
    args.apply(&mut config);

    let mut coordinator = open_coordinator(&config)?;
    coordinator.setup(false)?;
    let stats = coordinator.reconcile()?;
    coordinator.close()?;

    match ctx.format {
        OutputFormat::Json => ctx.to_json(&stats),
        OutputFormat::Text => Ok(format_reconcile(&stats)),
    }
}

fn format_reconcile(stats: &ReconcileStats) -> String {
    let mut output = format!(
        "Replayed {} pending files, {} remaining\n",
        stats.replayed, stats.remaining
    );
    if let Some(error) = &stats.error {
        output.push_str(&format!("Stopped at: {}\n", error));
    }
    output
}

#[derive(Serialize)]
struct ReindexReport {
    documents: usize,
}

/// Run the reindex command
pub fn run_reindex(args: &StoreArgs, ctx: &CommandContext) -> Result<String> {
    let mut config = ctx.load_config()?;
    args.apply(&mut config);

    let mut coordinator = open_coordinator(&config)?;
    coordinator.setup(false)?;
    let documents = coordinator.rebuild_index()?;
    coordinator.close()?;

    match ctx.format {
        OutputFormat::Json => ctx.to_json(&ReindexReport { documents }),
        OutputFormat::Text => Ok(format!("Rebuilt search index with {} documents\n", documents)),
    }
}
