//! Query command handlers - Read-only views of the index and the store

use serde::Serialize;
use serde_json::Value;

use crate::cli::{IndexArgs, OutputFormat, SearchArgs, StoreArgs};
use crate::commands::{open_index, CommandContext};
use crate::error::Result;
use crate::index::list_projects;
use crate::store::CaseStore;

/// Run the search command; JSON output is the backend response unmodified
pub fn run_search(args: &SearchArgs, ctx: &CommandContext) -> Result<String> {
    let mut config = ctx.load_config()?;
    args.index.apply(&mut config);

    let index = open_index(&config)?;
    let response = index.search(&args.query, args.limit)?;

    match ctx.format {
        OutputFormat::Json => ctx.to_json(&response),
        OutputFormat::Text => Ok(format_hits(&response)),
    }
}

fn format_hits(response: &Value) -> String {
    let hits = response
        .get("hits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if hits.is_empty() {
        return "No matching test cases.\n".to_string();
    }

    let field = |hit: &Value, name: &str| -> String {
        hit.get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let mut output = String::new();
    for hit in hits {
        output.push_str(&format!(
            "{}  {}\n",
            field(hit, "case_name"),
            field(hit, "file_path")
        ));
        let doc = field(hit, "case_description");
        if let Some(line) = doc.lines().next() {
            output.push_str(&format!("  {}\n", line));
        }
    }

    let total = response
        .get("estimatedTotalHits")
        .and_then(Value::as_u64)
        .unwrap_or(hits.len() as u64);
    output.push_str(&format!("\n{} of ~{} hits\n", hits.len(), total));
    output
}

/// Run the projects command
pub fn run_projects(args: &IndexArgs, ctx: &CommandContext) -> Result<String> {
    let mut config = ctx.load_config()?;
    args.apply(&mut config);

    let index = open_index(&config)?;
    let projects = list_projects(index.as_ref())?;

    match ctx.format {
        OutputFormat::Json => ctx.to_json(&projects),
        OutputFormat::Text if projects.is_empty() => Ok("No projects indexed.\n".to_string()),
        OutputFormat::Text => Ok(projects.join("\n") + "\n"),
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    store: String,
    index: String,
    files: usize,
    cases: usize,
    pending: Vec<String>,
}

/// Run the status command. Only the store is consulted.
pub fn run_status(args: &StoreArgs, ctx: &CommandContext) -> Result<String> {
    let mut config = ctx.load_config()?;
    args.apply(&mut config);

    let store = CaseStore::open(&config.store.path)?;
    let report = StatusReport {
        store: config.store.path.display().to_string(),
        index: format!("{} ({})", config.index.name, config.index.url),
        files: store.file_paths()?.len(),
        cases: store.count()?,
        pending: store.pending_paths()?,
    };
    store.close()?;

    match ctx.format {
        OutputFormat::Json => ctx.to_json(&report),
        OutputFormat::Text => Ok(format_status(&report)),
    }
}

fn format_status(report: &StatusReport) -> String {
    let mut output = format!("store:   {}\n", report.store);
    output.push_str(&format!("index:   {}\n", report.index));
    output.push_str(&format!(
        "cases:   {} in {} files\n",
        report.cases, report.files
    ));
    output.push_str(&format!("pending: {}\n", report.pending.len()));
    for path in &report.pending {
        output.push_str(&format!("  {}\n", path));
    }
    output
}
