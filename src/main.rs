//! case-indexer CLI entry point
//!
//! Subcommands:
//! - `watch` - scan, then keep the store and the index in sync until Ctrl-C
//! - `scan`, `reconcile`, `reindex` - one-shot maintenance
//! - `parse`, `search`, `projects`, `status` - read-only inspection

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use case_indexer::cli::{Cli, Commands};
use case_indexer::commands::{
    run_parse, run_projects, run_reconcile, run_reindex, run_scan, run_search, run_status,
    run_watch, CommandContext,
};
use case_indexer::{IndexerConfig, Result};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            if !output.is_empty() {
                print!("{}", output);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run(cli: Cli) -> Result<String> {
    let ctx = CommandContext::from_cli(cli.format, cli.verbose, cli.config.clone());
    init_logging(&ctx);

    match &cli.command {
        Commands::Watch(args) => run_watch(args, &ctx),
        Commands::Scan(args) => run_scan(args, &ctx),
        Commands::Reconcile(args) => run_reconcile(args, &ctx),
        Commands::Reindex(args) => run_reindex(args, &ctx),
        Commands::Parse(args) => run_parse(args, &ctx),
        Commands::Search(args) => run_search(args, &ctx),
        Commands::Projects(args) => run_projects(args, &ctx),
        Commands::Status(args) => run_status(args, &ctx),
    }
}

/// Logs go to stderr; stdout carries command output and `--events` lines.
fn init_logging(ctx: &CommandContext) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let mut filter = EnvFilter::from_default_env();
    if let Some(directive) = default_directive(ctx, rust_log.as_deref()) {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Only fails if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Directive added on top of `RUST_LOG`.
///
/// `--verbose` forces debug. Otherwise a non-empty `RUST_LOG` is left as
/// is, and the configured level applies only when it is unset.
fn default_directive(ctx: &CommandContext, rust_log: Option<&str>) -> Option<String> {
    if ctx.verbose {
        return Some("case_indexer=debug".to_string());
    }
    if rust_log.is_some_and(|v| !v.trim().is_empty()) {
        return None;
    }
    // A broken config is reported by the command itself
    let level = ctx
        .load_config()
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| IndexerConfig::default().logging.level);
    Some(format!("case_indexer={}", level))
}
