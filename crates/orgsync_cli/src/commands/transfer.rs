//! Transfer commands.

use super::{connect, open_local, print_report};
use orgsync_engine::{PushConfirmation, SyncConfig};
use orgsync_store::{LocalCacheArtifact, RemoteAdapter};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Remote tree -> canonical snapshot.
pub fn pull_tree(config: &SyncConfig, dry_run: bool) -> CommandResult {
    let report = connect(config)?.pull_tree(dry_run)?;
    print_report(&report);
    Ok(())
}

/// Canonical snapshot -> remote tree.
pub fn push_tree(config: &SyncConfig, yes: bool, dry_run: bool) -> CommandResult {
    if !yes && !dry_run {
        eprintln!("push-tree replaces the remote tree for every client.");
        eprintln!("Run pull-tree first if the remote may have changed, then re-run with --yes.");
    }
    let report = connect(config)?.push_tree(PushConfirmation::from_flag(yes), dry_run)?;
    print_report(&report);
    Ok(())
}

/// Remote positions -> canonical snapshot.
pub fn pull_positions(config: &SyncConfig, dry_run: bool) -> CommandResult {
    let report = connect(config)?.pull_positions(dry_run)?;
    print_report(&report);
    Ok(())
}

/// Canonical positions merged into the remote.
pub fn push_positions(config: &SyncConfig, dry_run: bool) -> CommandResult {
    let report = connect(config)?.push_positions(dry_run)?;
    print_report(&report);
    Ok(())
}

/// Canonical snapshot -> local cache loader.
pub fn export_cache(config: &SyncConfig) -> CommandResult {
    let orchestrator = connect(config)?;
    let cache = LocalCacheArtifact::new(&config.cache_path, orchestrator.remote().project_id());
    let report = orchestrator.export_cache(&cache)?;
    print_report(&report);
    println!("  Loader: {} ({})", cache.path().display(), cache.storage_key());
    Ok(())
}

/// Tree-shaped JSON file -> canonical snapshot.
pub fn import(config: &SyncConfig, input: &Path, dry_run: bool) -> CommandResult {
    info!("Importing {:?}", input);
    let payload: Value = serde_json::from_slice(&fs::read(input)?)?;
    let report = open_local(config)?.import_tree(payload, dry_run)?;
    print_report(&report);
    Ok(())
}
