//! Backup commands for the canonical snapshot.
//!
//! Listing and pruning work on the snapshot directory alone; only restore
//! goes through the orchestrator, so the restore is itself backed up and
//! verified.

use super::{open_local, print_report};
use orgsync_core::{BackupManager, BackupRecord, RetentionPolicy};
use orgsync_engine::SyncConfig;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use tracing::info;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Lists backups, oldest first.
pub fn list(config: &SyncConfig) -> CommandResult {
    let manager = BackupManager::new(&config.snapshot_path);
    let backups = manager.list()?;

    if backups.is_empty() {
        println!("No backups of {}", config.snapshot_path.display());
        return Ok(());
    }

    println!("Backups of {}:", config.snapshot_path.display());
    for backup in &backups {
        print_record(backup);
    }
    println!("  Total: {}", backups.len());
    Ok(())
}

/// Restores the snapshot from a backup file.
pub fn restore(config: &SyncConfig, backup: &Path) -> CommandResult {
    info!("Restoring snapshot from {:?}", backup);
    let report = open_local(config)?.restore_backup(backup)?;
    print_report(&report);
    Ok(())
}

/// Deletes backups outside the retention policy.
///
/// Flags override the policy from the configuration file. Without either,
/// nothing is deleted.
pub fn prune(
    config: &SyncConfig,
    keep_last: Option<usize>,
    max_age_days: Option<u64>,
    dry_run: bool,
) -> CommandResult {
    let policy = match (keep_last, max_age_days) {
        (Some(n), _) => RetentionPolicy::KeepLast(n),
        (None, Some(days)) => RetentionPolicy::max_age_days(days),
        (None, None) => config.retention(),
    };
    if policy == RetentionPolicy::KeepAll {
        println!("Retention policy keeps every backup; nothing to prune");
        return Ok(());
    }

    let manager = BackupManager::new(&config.snapshot_path);
    if dry_run {
        let backups = manager.list()?;
        let expired = policy.select_expired(&backups, orgsync_core::backup::now_ms());
        println!("Would remove {} of {} backups:", expired.len(), backups.len());
        for backup in expired {
            print_record(backup);
        }
        return Ok(());
    }

    let removed = manager.prune(&policy)?;
    println!("✓ Removed {} backups ({:?})", removed.len(), policy);
    for backup in &removed {
        print_record(backup);
    }
    Ok(())
}

fn print_record(backup: &BackupRecord) {
    println!(
        "  {}  {} bytes  {}",
        backup.path.display(),
        backup.size,
        format_timestamp(backup.timestamp_ms)
    );
}

fn format_timestamp(timestamp_ms: u64) -> String {
    let time = UNIX_EPOCH + Duration::from_millis(timestamp_ms);
    match time.elapsed() {
        Ok(age) => format!("({} ago)", format_age(age)),
        Err(_) => "(in the future)".to_string(),
    }
}

fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m", secs / 60),
        3600..=86_399 => format!("{}h", secs / 3600),
        _ => format!("{}d", secs / 86_400),
    }
}
