//! Status command implementation.

use super::connect;
use orgsync_core::CollectionCounts;
use orgsync_engine::{StatusReport, SyncConfig};
use serde::Serialize;
use std::collections::BTreeMap;

/// Serializable view of a [`StatusReport`].
#[derive(Debug, Serialize)]
pub struct StatusView {
    /// Project the commands operate on.
    pub project_id: String,
    /// Project selected by clients.
    pub active_project: Option<String>,
    /// Remote lock flag.
    pub locked: bool,
    /// Snapshot collection sizes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<BTreeMap<String, usize>>,
    /// Remote collection sizes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<BTreeMap<String, usize>>,
    /// Positioned nodes in the snapshot.
    pub snapshot_positions: usize,
    /// Remote position entries.
    pub remote_positions: Option<usize>,
    /// Remote connections.
    pub remote_connections: Option<usize>,
    /// Backups on disk.
    pub backups: usize,
    /// Collections whose sizes differ.
    pub diverging: Vec<String>,
    /// Ids used more than once in the snapshot.
    pub duplicate_ids: Vec<String>,
    /// Remote positions matching no snapshot node.
    pub orphaned_positions: Vec<String>,
    /// Connections with a missing endpoint.
    pub dangling_connections: Vec<(String, String)>,
}

fn counts_map(counts: &CollectionCounts) -> BTreeMap<String, usize> {
    counts
        .0
        .iter()
        .map(|(kind, count)| (kind.to_string(), *count))
        .collect()
}

impl From<StatusReport> for StatusView {
    fn from(report: StatusReport) -> Self {
        Self {
            diverging: report.diverging_collections(),
            snapshot: report.snapshot_counts.as_ref().map(counts_map),
            remote: report.remote_counts.as_ref().map(counts_map),
            project_id: report.project_id,
            active_project: report.active_project,
            locked: report.locked,
            snapshot_positions: report.snapshot_positions,
            remote_positions: report.remote_positions,
            remote_connections: report.remote_connections,
            backups: report.backups,
            duplicate_ids: report.validation.duplicate_ids,
            orphaned_positions: report.validation.orphaned_positions,
            dangling_connections: report.validation.dangling_connections,
        }
    }
}

/// Runs the status command.
pub fn run(config: &SyncConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = connect(config)?.status()?;
    let view = StatusView::from(report);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&view)?),
        "text" => print_text(&view, config),
        other => return Err(format!("Unknown format: {other}").into()),
    }
    Ok(())
}

fn print_text(view: &StatusView, config: &SyncConfig) {
    println!("Project: {}", view.project_id);
    if let Some(active) = view.active_project.as_deref().filter(|a| *a != view.project_id) {
        println!("  ⚠ Clients have selected another project: {active}");
    }
    println!("  Remote locked: {}", if view.locked { "yes" } else { "no" });
    println!();

    println!("Snapshot: {}", config.snapshot_path.display());
    match &view.snapshot {
        Some(counts) => print_counts(counts),
        None => println!("  (missing)"),
    }
    println!("  Positions: {}", view.snapshot_positions);
    println!("  Backups: {}", view.backups);
    println!();

    println!("Remote: {}", config.remote.base_url);
    match &view.remote {
        Some(counts) => print_counts(counts),
        None => println!("  (no tree)"),
    }
    match view.remote_positions {
        Some(n) => println!("  Positions: {n}"),
        None => println!("  Positions: (none)"),
    }
    if let Some(n) = view.remote_connections {
        println!("  Connections: {n}");
    }
    println!();

    let mut clean = true;
    if !view.diverging.is_empty() {
        clean = false;
        println!("⚠ Diverging collections: {}", view.diverging.join(", "));
    }
    if !view.duplicate_ids.is_empty() {
        clean = false;
        println!("✗ Duplicate ids: {}", view.duplicate_ids.join(", "));
    }
    if !view.orphaned_positions.is_empty() {
        clean = false;
        println!(
            "⚠ Orphaned positions: {}",
            view.orphaned_positions.join(", ")
        );
    }
    for (source, target) in &view.dangling_connections {
        clean = false;
        println!("⚠ Dangling connection: {source} -> {target}");
    }
    if clean {
        println!("✓ Snapshot and remote are consistent");
    }
}

fn print_counts(counts: &BTreeMap<String, usize>) {
    for (kind, count) in counts {
        println!("  {kind}: {count}");
    }
}
