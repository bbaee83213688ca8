//! Transfer and status reports.

use orgsync_core::{BackupRecord, CollectionCounts, PositionChange, ValidationReport};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The directional operations the orchestrator performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Remote tree -> canonical snapshot.
    PullTree,
    /// Canonical snapshot -> remote tree (destructive).
    PushTree,
    /// Remote positions -> canonical snapshot.
    PullPositions,
    /// Canonical positions merged into remote positions.
    PushPositions,
    /// Canonical snapshot -> local cache loader.
    ExportCache,
    /// Import payload -> canonical snapshot.
    ImportTree,
    /// Backup -> canonical snapshot.
    RestoreBackup,
}

impl Operation {
    /// Command-style name, e.g. `pull-tree`.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::PullTree => "pull-tree",
            Operation::PushTree => "push-tree",
            Operation::PullPositions => "pull-positions",
            Operation::PushPositions => "push-positions",
            Operation::ExportCache => "export-cache",
            Operation::ImportTree => "import",
            Operation::RestoreBackup => "restore",
        }
    }

    /// Returns true if the operation writes the canonical snapshot.
    pub fn writes_snapshot(&self) -> bool {
        matches!(
            self,
            Operation::PullTree
                | Operation::PullPositions
                | Operation::ImportTree
                | Operation::RestoreBackup
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The state of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// No transfer running.
    Idle,
    /// Reading the source store.
    Fetching,
    /// Decoding the fetched payload.
    Normalizing,
    /// Merging positions.
    Reconciling,
    /// Copying the canonical snapshot aside.
    BackingUp,
    /// Writing the destination store.
    Writing,
    /// Re-reading the destination.
    Verifying,
    /// The transfer completed.
    Done,
    /// The transfer aborted.
    Failed,
}

impl TransferState {
    /// Returns true while a transfer is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            TransferState::Idle | TransferState::Done | TransferState::Failed
        )
    }

    /// Returns true if a new transfer can start.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The destination did not read back as written.
///
/// Reported as a warning: the write itself succeeded and is not rolled back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("verification mismatch on {destination}: wrote {expected}, read back {actual}")]
pub struct VerificationMismatch {
    /// Store that was verified.
    pub destination: String,
    /// Sizes that were written.
    pub expected: String,
    /// Sizes that were read back.
    pub actual: String,
}

/// Outcome of the post-write check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Verification {
    /// Nothing was written, or verification is disabled.
    #[default]
    Skipped,
    /// The destination read back with the expected sizes.
    Passed,
    /// The destination read back with different sizes.
    Mismatch(VerificationMismatch),
}

impl Verification {
    /// Compares per-collection counts.
    ///
    /// A collection missing from either side counts as empty, so a store
    /// that drops empty containers still verifies.
    pub fn of_counts(
        destination: &str,
        expected: &CollectionCounts,
        actual: &CollectionCounts,
    ) -> Self {
        if expected.differing(actual).is_empty() {
            Verification::Passed
        } else {
            Verification::Mismatch(VerificationMismatch {
                destination: destination.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }

    /// Compares entry counts of a position map.
    pub fn of_len(destination: &str, expected: usize, actual: usize) -> Self {
        if expected == actual {
            Verification::Passed
        } else {
            Verification::Mismatch(VerificationMismatch {
                destination: destination.to_string(),
                expected: format!("{expected} positions"),
                actual: format!("{actual} positions"),
            })
        }
    }

    /// The mismatch, if any.
    pub fn mismatch(&self) -> Option<&VerificationMismatch> {
        match self {
            Verification::Mismatch(m) => Some(m),
            _ => None,
        }
    }
}

/// Result of one transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// Operation performed.
    pub operation: Operation,
    /// Final state.
    pub state: TransferState,
    /// States entered, in order.
    pub trace: Vec<TransferState>,
    /// No backup or write was performed.
    pub dry_run: bool,
    /// The destination was written.
    pub written: bool,
    /// Collection sizes of the transferred tree.
    pub counts: Option<CollectionCounts>,
    /// Number of entries in the transferred position map.
    pub position_count: Option<usize>,
    /// Ids whose position changed at the destination.
    pub changed_ids: Vec<String>,
    /// Position changes applied to the canonical snapshot.
    pub changes: Vec<PositionChange>,
    /// Position ids matching no node.
    pub orphaned_positions: Vec<String>,
    /// Backup taken before writing the canonical snapshot.
    pub backup: Option<BackupRecord>,
    /// Post-write check.
    pub verification: Verification,
    /// Wall-clock time of the transfer.
    pub duration: Duration,
}

impl TransferReport {
    /// Creates an empty report for `operation`.
    pub fn new(operation: Operation, dry_run: bool) -> Self {
        Self {
            operation,
            state: TransferState::Idle,
            trace: Vec::new(),
            dry_run,
            written: false,
            counts: None,
            position_count: None,
            changed_ids: Vec::new(),
            changes: Vec::new(),
            orphaned_positions: Vec::new(),
            backup: None,
            verification: Verification::Skipped,
            duration: Duration::ZERO,
        }
    }

    /// Returns true if the transfer found nothing to write.
    pub fn is_noop(&self) -> bool {
        !self.written && !self.dry_run
    }
}

/// Read-only summary of all stores.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    /// Project the remote adapter is scoped to.
    pub project_id: String,
    /// Project currently selected by clients.
    pub active_project: Option<String>,
    /// Remote lock flag.
    pub locked: bool,
    /// Collection sizes of the canonical snapshot, if present.
    pub snapshot_counts: Option<CollectionCounts>,
    /// Positioned nodes in the canonical snapshot.
    pub snapshot_positions: usize,
    /// Collection sizes of the remote tree, if present.
    pub remote_counts: Option<CollectionCounts>,
    /// Entries of the remote position map, if present.
    pub remote_positions: Option<usize>,
    /// Remote connections, if present.
    pub remote_connections: Option<usize>,
    /// Number of backups on disk.
    pub backups: usize,
    /// Integrity findings for the canonical snapshot.
    pub validation: ValidationReport,
}

impl StatusReport {
    /// Collections whose size differs between snapshot and remote.
    pub fn diverging_collections(&self) -> Vec<String> {
        match (&self.snapshot_counts, &self.remote_counts) {
            (Some(local), Some(remote)) => local
                .differing(remote)
                .into_iter()
                .map(|kind| kind.to_string())
                .collect(),
            _ => Vec::new(),
        }
    }
}
