use crate::cli::commands::{Cli, Commands};
use anyhow::{Context, Result};
use conductor::audit::{AuditStore, EntryFilter};
use conductor::capabilities::{Prefer, TaskInput};
use conductor::retention::{CompactionSettings, Compactor};
use conductor::runs::Orchestrator;
use conductor::session::Workspace;
use conductor::{Config, ServiceSet};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const STATUS_POLL: Duration = Duration::from_millis(500);

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Run {
            url,
            html_file,
            name,
            notes,
            prefer,
            max_steps,
        } => run(config, url, html_file, name, notes, prefer, max_steps).await,
        Commands::Audit {
            raw,
            agent,
            kind,
            since,
        } => audit(&config, raw, EntryFilter {
            agents: agent,
            kinds: kind,
            since_id: since,
        }),
        Commands::Compact => compact(config).await,
        Commands::Measure => measure(&config),
    }
}

async fn run(
    config: Config,
    url: String,
    html_file: Option<PathBuf>,
    name: Option<String>,
    notes: Option<String>,
    prefer: Prefer,
    max_steps: Option<i64>,
) -> Result<()> {
    let html = match html_file {
        Some(path) => Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => None,
    };
    let input = TaskInput {
        url: Some(url),
        html,
        algo_name: name,
        notes,
        prefer,
        max_steps,
    };

    let orchestrator = Orchestrator::new(Arc::new(Workspace::open(config)?));
    let run_id = orchestrator.start(input)?;
    info!(run_id = %run_id, "run submitted");
    let state = orchestrator
        .wait(&run_id, STATUS_POLL)
        .await
        .with_context(|| format!("run {run_id} disappeared"))?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

fn open_store(config: &Config) -> Result<AuditStore> {
    AuditStore::open(config.log_dir(), config.retention.clone()).context("Failed to open audit logs")
}

fn audit(config: &Config, raw: bool, filter: EntryFilter) -> Result<()> {
    let store = open_store(config)?;
    for entry in store.query(&filter, raw)? {
        println!("{}", serde_json::to_string(&entry)?);
    }
    Ok(())
}

async fn compact(config: Config) -> Result<()> {
    let services = ServiceSet::from_config(&config)?;
    let store = Arc::new(open_store(&config)?);
    let compactor = Compactor::new(
        Arc::clone(&services.history_compressor),
        CompactionSettings::from_config(&config.retention),
    );
    match store.compact_now(Some(&compactor), true).await? {
        Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        None => println!("Nothing to compact."),
    }
    Ok(())
}

fn measure(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let file = store.measure()?;
    let report = json!({
        "workingEntries": store.working_entries().len(),
        "estimatedTokens": store.estimated_tokens(),
        "fileChars": file.file_chars,
        "fileLines": file.file_lines,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
