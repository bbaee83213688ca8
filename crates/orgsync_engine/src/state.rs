//! Sync orchestrator and per-transfer state machine.
//!
//! Every transfer runs to completion on the calling thread:
//!
//! ```text
//! Idle -> Fetching -> Normalizing -> [Reconciling] -> [BackingUp] -> Writing -> [Verifying] -> Done
//!                                                                                         \-> Failed
//! ```
//!
//! `BackingUp` is entered only when the destination is the canonical
//! snapshot; `Reconciling` only for position transfers.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::report::{
    Operation, StatusReport, TransferReport, TransferState, Verification, VerificationMismatch,
};
use orgsync_core::positions::{changed_ids, orphaned_positions};
use orgsync_core::validate::duplicate_ids;
use orgsync_core::{
    apply_positions_in_place, extract_positions, normalize, normalize_connections,
    normalize_positions, reconcile, validate, BackupManager, BackupRecord,
    CoreError, OrgTree, RetentionPolicy,
};
use orgsync_store::{paths, RemoteAdapter, SnapshotFile, TreeStore};
use parking_lot::RwLock;
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Operator acknowledgement for a destructive remote overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushConfirmation {
    /// The operator did not confirm.
    Unconfirmed,
    /// The operator confirmed that the remote tree may be replaced.
    Confirmed,
}

impl PushConfirmation {
    /// Maps a `--yes` style flag.
    pub fn from_flag(confirmed: bool) -> Self {
        if confirmed {
            PushConfirmation::Confirmed
        } else {
            PushConfirmation::Unconfirmed
        }
    }

    fn check(self) -> SyncResult<()> {
        match self {
            PushConfirmation::Confirmed => Ok(()),
            PushConfirmation::Unconfirmed => Err(SyncError::ConfirmationRequired),
        }
    }
}

/// Statistics accumulated across transfers.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Transfers that reached `Done`.
    pub transfers_completed: u64,
    /// Transfers that reached `Failed`.
    pub transfers_failed: u64,
    /// Destination writes performed.
    pub writes: u64,
    /// Position ids changed at a destination.
    pub positions_changed: u64,
    /// Backups taken before snapshot writes.
    pub backups_created: u64,
    /// Writes that did not read back as expected.
    pub verification_mismatches: u64,
    /// Completion time of the last successful transfer.
    pub last_transfer_time: Option<Instant>,
    /// Message of the last failure.
    pub last_error: Option<String>,
}

/// Performs directional transfers between the canonical snapshot and the
/// remote store.
pub struct SyncOrchestrator<R: RemoteAdapter> {
    canonical: SnapshotFile,
    remote: R,
    backups: BackupManager,
    verify_after_write: bool,
    respect_remote_lock: bool,
    state: RwLock<TransferState>,
    stats: RwLock<SyncStats>,
}

impl<R: RemoteAdapter> SyncOrchestrator<R> {
    /// Creates an orchestrator for the snapshot named in `config`.
    pub fn new(config: &SyncConfig, remote: R) -> Self {
        Self {
            canonical: SnapshotFile::new(&config.snapshot_path),
            remote,
            backups: BackupManager::new(&config.snapshot_path),
            verify_after_write: config.verify_after_write,
            respect_remote_lock: config.respect_remote_lock,
            state: RwLock::new(TransferState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> TransferState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The canonical snapshot adapter.
    pub fn canonical(&self) -> &SnapshotFile {
        &self.canonical
    }

    /// The remote store adapter.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// The backup manager of the canonical snapshot.
    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Remote tree -> canonical snapshot.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NoRemoteData`] if the remote holds no tree; nothing is written
    /// - [`CoreError::MalformedTree`] if the remote tree cannot be normalized
    /// - [`CoreError::BackupWrite`] if the pre-write backup fails; nothing is written
    pub fn pull_tree(&self, dry_run: bool) -> SyncResult<TransferReport> {
        self.run(Operation::PullTree, dry_run, |report| {
            let raw = self
                .remote
                .read_tree()?
                .ok_or_else(|| SyncError::NoRemoteData {
                    path: paths::org_data(self.remote.project_id()),
                })?;

            self.enter(report, TransferState::Normalizing);
            let tree = normalize(raw)?;
            report.counts = Some(tree.counts());
            warn_duplicates(&tree);

            if dry_run {
                return Ok(());
            }
            self.write_snapshot(report, &tree)
        })
    }

    /// Canonical snapshot -> remote tree.
    ///
    /// Replaces the remote tree entirely. No staleness check exists: remote
    /// edits made since the last [`Self::pull_tree`] are lost.
    pub fn push_tree(
        &self,
        confirmation: PushConfirmation,
        dry_run: bool,
    ) -> SyncResult<TransferReport> {
        self.run(Operation::PushTree, dry_run, |report| {
            if !dry_run {
                confirmation.check()?;
                self.check_remote_lock()?;
            }

            let tree = self.read_canonical(report)?;
            report.counts = Some(tree.counts());

            if dry_run {
                return Ok(());
            }

            warn!(
                project_id = %self.remote.project_id(),
                "push-tree replaces the remote tree; remote changes made since the last pull-tree are lost"
            );
            self.enter(report, TransferState::Writing);
            self.remote.write_tree(&tree)?;
            report.written = true;

            if self.verify_after_write {
                self.enter(report, TransferState::Verifying);
                report.verification = verify_tree(&self.remote, &tree);
            }
            Ok(())
        })
    }

    /// Remote positions -> canonical snapshot.
    ///
    /// Only records whose position actually changed are touched. When
    /// nothing changed, no backup is taken and nothing is written.
    pub fn pull_positions(&self, dry_run: bool) -> SyncResult<TransferReport> {
        self.run(Operation::PullPositions, dry_run, |report| {
            let raw_positions =
                self.remote
                    .read_positions()?
                    .ok_or_else(|| SyncError::NoRemotePositions {
                        path: paths::positions(self.remote.project_id()),
                    })?;
            let raw_tree = self.canonical.read_tree()?.ok_or_else(|| self.no_snapshot())?;

            self.enter(report, TransferState::Normalizing);
            let positions = normalize_positions(raw_positions)?;
            let mut tree = normalize(raw_tree)?;

            self.enter(report, TransferState::Reconciling);
            let changes = apply_positions_in_place(&mut tree, &positions);
            for change in &changes {
                debug!(id = %change.id, before = ?change.before, after = ?change.after, "position changed");
            }
            report.position_count = Some(positions.len());
            report.counts = Some(tree.counts());
            report.changed_ids = changes.iter().map(|c| c.id.clone()).collect();
            report.changes = changes;
            report.orphaned_positions = orphaned_positions(&tree, &positions);
            warn_orphans(&report.orphaned_positions);

            if report.changes.is_empty() {
                info!("canonical positions already match the remote");
                return Ok(());
            }
            if dry_run {
                return Ok(());
            }
            self.write_snapshot(report, &tree)
        })
    }

    /// Canonical positions merged into remote positions.
    ///
    /// The canonical side wins for ids present on both sides; remote-only
    /// ids are preserved. An absent remote map counts as empty.
    pub fn push_positions(&self, dry_run: bool) -> SyncResult<TransferReport> {
        self.run(Operation::PushPositions, dry_run, |report| {
            if !dry_run {
                self.check_remote_lock()?;
            }
            let raw_tree = self.canonical.read_tree()?.ok_or_else(|| self.no_snapshot())?;
            let raw_remote = self.remote.read_positions()?;

            self.enter(report, TransferState::Normalizing);
            let tree = normalize(raw_tree)?;
            let remote_positions = raw_remote
                .map(normalize_positions)
                .transpose()?
                .unwrap_or_default();

            self.enter(report, TransferState::Reconciling);
            let local = extract_positions(&tree);
            let merged = reconcile(&remote_positions, &local);
            report.changed_ids = changed_ids(&remote_positions, &merged);
            report.position_count = Some(merged.len());
            report.orphaned_positions = orphaned_positions(&tree, &merged);
            warn_orphans(&report.orphaned_positions);

            if report.changed_ids.is_empty() {
                info!("remote positions already match the canonical snapshot");
                return Ok(());
            }
            if dry_run {
                return Ok(());
            }

            self.enter(report, TransferState::Writing);
            self.remote.write_positions(&merged)?;
            report.written = true;

            if self.verify_after_write {
                self.enter(report, TransferState::Verifying);
                let destination = format!("{} positions", self.remote.describe());
                report.verification = match self
                    .remote
                    .read_positions()
                    .map_err(SyncError::from)
                    .and_then(|raw| Ok(raw.map(normalize_positions).transpose()?))
                {
                    Ok(actual) => Verification::of_len(
                        &destination,
                        merged.len(),
                        actual.map_or(0, |p| p.len()),
                    ),
                    Err(e) => unreadable(destination, format!("{} positions", merged.len()), &e),
                };
            }
            Ok(())
        })
    }

    /// Canonical snapshot -> local cache loader artifact.
    pub fn export_cache<S: TreeStore>(&self, cache: &S) -> SyncResult<TransferReport> {
        self.run(Operation::ExportCache, false, |report| {
            let tree = self.read_canonical(report)?;
            report.counts = Some(tree.counts());

            self.enter(report, TransferState::Writing);
            cache.write_tree(&tree)?;
            report.written = true;

            if self.verify_after_write {
                self.enter(report, TransferState::Verifying);
                report.verification = verify_tree(cache, &tree);
            }
            Ok(())
        })
    }

    /// Import payload -> canonical snapshot.
    ///
    /// The payload must already be tree-shaped. Duplicate ids are rejected
    /// since they would break position projection.
    pub fn import_tree(&self, payload: Value, dry_run: bool) -> SyncResult<TransferReport> {
        self.run(Operation::ImportTree, dry_run, |report| {
            self.enter(report, TransferState::Normalizing);
            let tree = normalize(payload)?;
            let duplicates = duplicate_ids(&tree);
            if !duplicates.is_empty() {
                return Err(CoreError::malformed(
                    "import",
                    format!("duplicate ids: {}", duplicates.join(", ")),
                )
                .into());
            }
            report.counts = Some(tree.counts());

            if dry_run {
                return Ok(());
            }
            self.write_snapshot(report, &tree)
        })
    }

    /// Backup -> canonical snapshot.
    ///
    /// The backup must hold a readable tree. The current snapshot is backed
    /// up first, under the same lock as the restore.
    pub fn restore_backup(&self, backup: &Path) -> SyncResult<TransferReport> {
        self.run(Operation::RestoreBackup, false, |report| {
            let raw = SnapshotFile::new(backup)
                .read_tree()?
                .ok_or_else(|| CoreError::BackupNotFound(backup.to_path_buf()))?;

            self.enter(report, TransferState::Normalizing);
            let tree = normalize(raw)?;
            report.counts = Some(tree.counts());

            self.enter(report, TransferState::Writing);
            let guard = self.backups.restore(backup)?;
            report.backup = guard.backup().cloned();
            report.written = true;

            if self.verify_after_write {
                self.enter(report, TransferState::Verifying);
                report.verification = verify_tree(&self.canonical, &tree);
            }
            Ok(())
        })
    }

    /// Lists backups of the canonical snapshot, oldest first.
    pub fn list_backups(&self) -> SyncResult<Vec<BackupRecord>> {
        Ok(self.backups.list()?)
    }

    /// Deletes the backups selected by `policy`.
    pub fn prune_backups(&self, policy: &RetentionPolicy) -> SyncResult<Vec<BackupRecord>> {
        let removed = self.backups.prune(policy)?;
        if !removed.is_empty() {
            info!(removed = removed.len(), ?policy, "backups pruned");
        }
        Ok(removed)
    }

    /// Read-only summary of the snapshot and the remote.
    pub fn status(&self) -> SyncResult<StatusReport> {
        let snapshot = self.canonical.read_tree()?.map(normalize).transpose()?;
        let remote_tree = self.remote.read_tree()?.map(normalize).transpose()?;
        let remote_positions = self
            .remote
            .read_positions()?
            .map(normalize_positions)
            .transpose()?;
        let connections = self
            .remote
            .read_connections()?
            .map(normalize_connections)
            .transpose()?;

        let validation = snapshot
            .as_ref()
            .map(|tree| validate(tree, remote_positions.as_ref(), connections.as_deref()))
            .unwrap_or_default();

        Ok(StatusReport {
            project_id: self.remote.project_id().to_string(),
            active_project: self.remote.active_project()?,
            locked: self.remote.is_locked()?,
            snapshot_positions: snapshot.as_ref().map_or(0, |t| extract_positions(t).len()),
            snapshot_counts: snapshot.map(|t| t.counts()),
            remote_counts: remote_tree.map(|t| t.counts()),
            remote_positions: remote_positions.map(|p| p.len()),
            remote_connections: connections.map(|c| c.len()),
            backups: self.backups.list()?.len(),
            validation,
        })
    }

    /// Runs one transfer, tracking state and stats.
    fn run<F>(&self, operation: Operation, dry_run: bool, body: F) -> SyncResult<TransferReport>
    where
        F: FnOnce(&mut TransferReport) -> SyncResult<()>,
    {
        let start = Instant::now();
        {
            let mut state = self.state.write();
            if !state.can_start() {
                return Err(SyncError::InvalidStateTransition {
                    from: state.to_string(),
                    to: operation.to_string(),
                });
            }
            *state = TransferState::Fetching;
        }

        let mut report = TransferReport::new(operation, dry_run);
        report.state = TransferState::Fetching;
        report.trace.push(TransferState::Fetching);
        debug!(%operation, dry_run, "transfer started");

        let outcome = body(&mut report);
        report.duration = start.elapsed();

        match outcome {
            Ok(()) => {
                self.enter(&mut report, TransferState::Done);
                if let Some(mismatch) = report.verification.mismatch() {
                    warn!(%operation, "{mismatch}");
                }
                self.record_success(&report);
                info!(
                    %operation,
                    dry_run,
                    written = report.written,
                    changed = report.changed_ids.len(),
                    duration_ms = report.duration.as_millis() as u64,
                    "transfer complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.enter(&mut report, TransferState::Failed);
                error!(%operation, error = %e, "transfer failed");
                let mut stats = self.stats.write();
                stats.transfers_failed += 1;
                stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn enter(&self, report: &mut TransferReport, state: TransferState) {
        debug!(operation = %report.operation, from = %report.state, to = %state, "transfer state");
        *self.state.write() = state;
        report.state = state;
        report.trace.push(state);
    }

    fn record_success(&self, report: &TransferReport) {
        let mut stats = self.stats.write();
        stats.transfers_completed += 1;
        if report.written {
            stats.writes += 1;
            stats.positions_changed += report.changed_ids.len() as u64;
        }
        if report.backup.is_some() {
            stats.backups_created += 1;
        }
        if report.verification.mismatch().is_some() {
            stats.verification_mismatches += 1;
        }
        stats.last_transfer_time = Some(Instant::now());
        stats.last_error = None;
    }

    /// Backs up, then replaces the canonical snapshot with `tree`.
    ///
    /// The snapshot lock is held from the backup through verification.
    fn write_snapshot(&self, report: &mut TransferReport, tree: &OrgTree) -> SyncResult<()> {
        self.enter(report, TransferState::BackingUp);
        let guard = self.backups.begin_write()?;
        report.backup = guard.backup().cloned();

        self.enter(report, TransferState::Writing);
        self.canonical.write_tree(tree)?;
        report.written = true;

        if self.verify_after_write {
            self.enter(report, TransferState::Verifying);
            report.verification = verify_tree(&self.canonical, tree);
        }
        drop(guard);
        Ok(())
    }

    fn read_canonical(&self, report: &mut TransferReport) -> SyncResult<OrgTree> {
        let raw = self.canonical.read_tree()?.ok_or_else(|| self.no_snapshot())?;
        self.enter(report, TransferState::Normalizing);
        Ok(normalize(raw)?)
    }

    fn check_remote_lock(&self) -> SyncResult<()> {
        if !self.remote.is_locked()? {
            return Ok(());
        }
        if self.respect_remote_lock {
            return Err(SyncError::RemoteLocked {
                project_id: self.remote.project_id().to_string(),
            });
        }
        warn!(
            project_id = %self.remote.project_id(),
            "remote is locked; writing anyway because the lock check is disabled"
        );
        Ok(())
    }

    fn no_snapshot(&self) -> SyncError {
        SyncError::NoSnapshot {
            path: self.canonical.path().to_path_buf(),
        }
    }
}

/// Re-reads `store` and compares collection sizes with what was written.
///
/// An unreadable destination is reported as a mismatch, not an error: the
/// write itself already succeeded.
fn verify_tree<S: TreeStore + ?Sized>(store: &S, written: &OrgTree) -> Verification {
    let expected = written.counts();
    let read_back = store
        .read_tree()
        .map_err(SyncError::from)
        .and_then(|raw| Ok(raw.map(normalize).transpose()?));
    match read_back {
        Ok(tree) => Verification::of_counts(
            &store.describe(),
            &expected,
            &tree.map(|t| t.counts()).unwrap_or_default(),
        ),
        Err(e) => unreadable(store.describe(), expected.to_string(), &e),
    }
}

fn unreadable(destination: String, expected: String, error: &SyncError) -> Verification {
    Verification::Mismatch(VerificationMismatch {
        destination,
        expected,
        actual: format!("unreadable ({error})"),
    })
}

fn warn_duplicates(tree: &OrgTree) {
    let duplicates = duplicate_ids(tree);
    if !duplicates.is_empty() {
        warn!(ids = ?duplicates, "tree contains duplicate ids");
    }
}

fn warn_orphans(orphans: &[String]) {
    if !orphans.is_empty() {
        warn!(count = orphans.len(), ids = ?orphans, "keeping positions that match no node");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgsync_core::{Position, Unit};
    use orgsync_store::{MemoryKeyValueStore, RemoteStore};
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (
        TempDir,
        MemoryKeyValueStore,
        SyncOrchestrator<RemoteStore<MemoryKeyValueStore>>,
    ) {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::new("https://test.example.com")
            .with_snapshot_path(dir.path().join("orgData.json"));
        let kv = MemoryKeyValueStore::new();
        let remote = RemoteStore::new(kv.clone(), "p1").unwrap();
        (dir, kv, SyncOrchestrator::new(&config, remote))
    }

    fn seed_snapshot(orchestrator: &SyncOrchestrator<RemoteStore<MemoryKeyValueStore>>, tree: &OrgTree) {
        orchestrator.canonical().write_tree(tree).unwrap();
    }

    #[test]
    fn initial_state() {
        let (_dir, _kv, orchestrator) = setup();
        assert_eq!(orchestrator.state(), TransferState::Idle);
        assert_eq!(orchestrator.stats().transfers_completed, 0);
    }

    #[test]
    fn pull_tree_trace() {
        let (_dir, kv, orchestrator) = setup();
        kv.seed("orgData/p1", json!({"coordinators": [{"id": "a", "title": "A"}]}));

        let report = orchestrator.pull_tree(false).unwrap();
        assert_eq!(
            report.trace,
            vec![
                TransferState::Fetching,
                TransferState::Normalizing,
                TransferState::BackingUp,
                TransferState::Writing,
                TransferState::Verifying,
                TransferState::Done,
            ]
        );
        assert_eq!(report.verification, Verification::Passed);
        assert_eq!(orchestrator.state(), TransferState::Done);
        // first pull: nothing to back up yet
        assert!(report.backup.is_none());
    }

    #[test]
    fn failed_transfer_records_error() {
        let (_dir, _kv, orchestrator) = setup();
        let err = orchestrator.pull_tree(false).unwrap_err();
        assert!(matches!(err, SyncError::NoRemoteData { .. }));
        assert_eq!(orchestrator.state(), TransferState::Failed);

        let stats = orchestrator.stats();
        assert_eq!(stats.transfers_failed, 1);
        assert_eq!(stats.last_error.as_deref(), Some("no remote data at orgData/p1"));
    }

    #[test]
    fn push_tree_requires_confirmation() {
        let (_dir, kv, orchestrator) = setup();
        let mut tree = OrgTree::new();
        tree.executives.push(Unit::new("e", "Exec"));
        seed_snapshot(&orchestrator, &tree);

        let err = orchestrator
            .push_tree(PushConfirmation::Unconfirmed, false)
            .unwrap_err();
        assert!(matches!(err, SyncError::ConfirmationRequired));
        assert_eq!(kv.write_count(), 0);

        // dry run needs no confirmation and writes nothing
        let report = orchestrator
            .push_tree(PushConfirmation::Unconfirmed, true)
            .unwrap();
        assert!(!report.written);
        assert_eq!(kv.write_count(), 0);

        let report = orchestrator
            .push_tree(PushConfirmation::Confirmed, false)
            .unwrap();
        assert!(report.written);
        assert_eq!(kv.write_count(), 1);
    }

    #[test]
    fn pull_positions_without_changes_is_noop() {
        let (_dir, kv, orchestrator) = setup();
        let mut tree = OrgTree::new();
        tree.coordinators
            .push(Unit::new("a", "A").with_position(Position::new(1.0, 2.0)));
        seed_snapshot(&orchestrator, &tree);
        kv.seed("positions/p1", json!({"a": {"x": 1.0, "y": 2.0}}));

        let report = orchestrator.pull_positions(false).unwrap();
        assert!(report.is_noop());
        assert!(report.changed_ids.is_empty());
        assert!(!report.trace.contains(&TransferState::BackingUp));
        assert!(orchestrator.list_backups().unwrap().is_empty());
    }

    #[test]
    fn pull_positions_dry_run_reports_changes() {
        let (_dir, kv, orchestrator) = setup();
        let mut tree = OrgTree::new();
        tree.coordinators
            .push(Unit::new("a", "A").with_position(Position::new(1.0, 2.0)));
        seed_snapshot(&orchestrator, &tree);
        kv.seed("positions/p1", json!({"a": {"x": 5.0, "y": 2.0}}));

        let report = orchestrator.pull_positions(true).unwrap();
        assert_eq!(report.changed_ids, vec!["a"]);
        assert!(!report.written);

        let on_disk = normalize(orchestrator.canonical().read_tree().unwrap().unwrap()).unwrap();
        assert_eq!(on_disk, tree);
    }

    #[test]
    fn status_of_empty_stores() {
        let (_dir, _kv, orchestrator) = setup();
        let status = orchestrator.status().unwrap();
        assert_eq!(status.project_id, "p1");
        assert!(!status.locked);
        assert!(status.snapshot_counts.is_none());
        assert!(status.remote_counts.is_none());
        assert_eq!(status.backups, 0);
        assert!(status.validation.is_clean());
    }

    #[test]
    fn confirmation_from_flag() {
        assert_eq!(PushConfirmation::from_flag(true), PushConfirmation::Confirmed);
        assert_eq!(PushConfirmation::from_flag(false), PushConfirmation::Unconfirmed);
    }
}
