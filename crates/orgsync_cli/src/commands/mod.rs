//! CLI command implementations.

pub mod backup;
pub mod status;
pub mod transfer;

use crate::http::ReqwestClient;
use orgsync_engine::{
    resolve_project_id, SyncConfig, SyncOrchestrator, TransferReport, Verification,
    DEFAULT_PROJECT_ID,
};
use orgsync_store::{HttpKeyValueStore, RemoteStore};
use tracing::debug;

/// The remote adapter used by every command.
pub type HttpRemote = RemoteStore<HttpKeyValueStore<ReqwestClient>>;

type Orchestrator = SyncOrchestrator<HttpRemote>;

/// Builds the orchestrator for `config`, resolving the project first.
pub fn connect(config: &SyncConfig) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    config.validate()?;
    let kv = HttpKeyValueStore::new(&config.remote, ReqwestClient::new(&config.remote)?);
    let project_id = resolve_project_id(&kv, config.project_id.as_deref())?;
    debug!(
        project_id = %project_id,
        remote = kv.base_url(),
        snapshot = %config.snapshot_path.display(),
        "connecting"
    );
    let remote = RemoteStore::new(kv, project_id)?;
    Ok(SyncOrchestrator::new(config, remote))
}

/// Builds the orchestrator for snapshot-only commands.
///
/// The remote is neither required nor contacted: the project comes from
/// the configuration alone, so restore and import work offline.
pub fn open_local(config: &SyncConfig) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    config.validate_local()?;
    let project_id = config.project_id.as_deref().unwrap_or(DEFAULT_PROJECT_ID);
    debug!(project_id, snapshot = %config.snapshot_path.display(), "opening snapshot");
    let kv = HttpKeyValueStore::new(&config.remote, ReqwestClient::new(&config.remote)?);
    let remote = RemoteStore::new(kv, project_id)?;
    Ok(SyncOrchestrator::new(config, remote))
}

/// Prints the outcome of a transfer.
pub fn print_report(report: &TransferReport) {
    let verb = if report.dry_run {
        "would complete"
    } else if report.written {
        "completed"
    } else {
        "had nothing to write"
    };
    println!("✓ {} {}", report.operation, verb);

    if let Some(counts) = &report.counts {
        println!("  Collections: {counts}");
    }
    if let Some(count) = report.position_count {
        println!("  Positions: {count}");
    }
    if !report.changed_ids.is_empty() {
        println!(
            "  Changed: {} ({})",
            report.changed_ids.len(),
            report.changed_ids.join(", ")
        );
    }
    if !report.orphaned_positions.is_empty() {
        println!("  Orphaned positions kept: {}", report.orphaned_positions.len());
    }
    match &report.backup {
        Some(backup) => println!("  Backup: {}", backup.path.display()),
        None if report.written && report.operation.writes_snapshot() => {
            println!("  Backup: none (no previous snapshot)")
        }
        None => {}
    }
    match &report.verification {
        Verification::Passed => println!("  Verification: passed"),
        Verification::Mismatch(mismatch) => println!("  ⚠ Verification: {mismatch}"),
        Verification::Skipped => {}
    }
    println!("  Duration: {} ms", report.duration.as_millis());
}
