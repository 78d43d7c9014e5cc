//! cmdb_sync - transfer one configuration item between two store snapshots
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌──────────┐
//! │  source  │───▶│ Orchestrator │───▶│  target  │
//! │  (JSON)  │    │ (map/commit) │    │  (JSON)  │
//! └──────────┘    └──────────────┘    └──────────┘
//! ```
//!
//! Usage:
//!
//! ```text
//! cmdb_sync --source src.json --target dst.json --class BMC_COMPUTERSYSTEM --instance CI-1 [--env dev]
//! ```
//!
//! The report is printed to stdout as JSON; the target snapshot is written back.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use cmdb_sync::config::AppConfig;
use cmdb_sync::sync::{EntitySelector, MemoryStore, RecordStore, TransferOrchestrator};

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn get_selector() -> Result<EntitySelector> {
    let instance = get_arg(&["--instance", "-i"]).context("--instance is required")?;
    match (get_arg(&["--class"]), get_arg(&["--form"])) {
        (Some(class_id), None) => Ok(EntitySelector::by_class(class_id, instance)),
        (None, Some(form)) => Ok(EntitySelector::by_form(form, instance)),
        _ => bail!("exactly one of --class or --form is required"),
    }
}

fn open_store(name: &str, path: &str) -> Result<MemoryStore> {
    if Path::new(path).exists() {
        MemoryStore::load_json(name, path).with_context(|| format!("loading {} store", name))
    } else {
        tracing::warn!(store = name, path, "Snapshot not found, starting empty");
        Ok(MemoryStore::new(name))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = cmdb_sync::logging::init_logging(&app_config);

    tracing::info!("Starting cmdb_sync in {} mode", env);

    let selector = get_selector()?;
    let source_path = get_arg(&["--source"]).context("--source is required")?;
    let target_path = get_arg(&["--target"]).context("--target is required")?;

    let source = Arc::new(open_store("source", &source_path)?);
    let target = Arc::new(open_store("target", &target_path)?);

    let orchestrator = TransferOrchestrator::new(
        source as Arc<dyn RecordStore>,
        target.clone() as Arc<dyn RecordStore>,
        app_config.sync.clone(),
    );

    let report = orchestrator.transfer(&selector).await?;

    target
        .save_json(&target_path)
        .with_context(|| format!("writing {}", target_path))?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_complete() {
        tracing::warn!(
            transfer_id = %report.transfer_id,
            skipped = report.skipped_parts.len(),
            "Transfer partially successful"
        );
    }
    Ok(())
}
