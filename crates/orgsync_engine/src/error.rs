//! Error types for the sync engine.

use orgsync_core::CoreError;
use orgsync_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a transfer.
///
/// Every variant is fatal: nothing is retried, and the invoking process is
/// expected to stop with a non-zero exit.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store holds no tree for the project.
    #[error("no remote data at {path}")]
    NoRemoteData {
        /// Key path that was read.
        path: String,
    },

    /// The remote store holds no position map for the project.
    #[error("no remote positions at {path}")]
    NoRemotePositions {
        /// Key path that was read.
        path: String,
    },

    /// The canonical snapshot does not exist yet.
    #[error("no canonical snapshot at {}", path.display())]
    NoSnapshot {
        /// Snapshot location.
        path: PathBuf,
    },

    /// A destructive remote overwrite was attempted without confirmation.
    #[error("push-tree overwrites the remote tree and requires explicit confirmation")]
    ConfirmationRequired,

    /// Clients have locked the remote chart.
    #[error("remote project {project_id} is locked")]
    RemoteLocked {
        /// Locked project.
        project_id: String,
    },

    /// Normalization, backup or snapshot locking failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A store could not be read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Another operation is already running on this orchestrator.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted operation.
        to: String,
    },

    /// The configuration cannot be used.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Returns true if the error must abort the invoking process.
    ///
    /// There is no retry layer, so every error is currently fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::NoRemoteData { .. }
            | SyncError::NoRemotePositions { .. }
            | SyncError::NoSnapshot { .. }
            | SyncError::ConfirmationRequired
            | SyncError::RemoteLocked { .. }
            | SyncError::Core(_)
            | SyncError::Store(_)
            | SyncError::InvalidStateTransition { .. }
            | SyncError::Config(_) => true,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::NoRemoteData { .. }
            | SyncError::NoRemotePositions { .. }
            | SyncError::NoSnapshot { .. } => 3,
            SyncError::Core(CoreError::MalformedTree { .. }) => 4,
            SyncError::Core(CoreError::BackupWrite { .. }) => 5,
            SyncError::ConfirmationRequired | SyncError::RemoteLocked { .. } => 6,
            SyncError::Core(CoreError::SnapshotLocked(_))
            | SyncError::InvalidStateTransition { .. } => 7,
            SyncError::Store(StoreError::Transport { .. }) => 8,
            SyncError::Config(_) => 2,
            _ => 1,
        }
    }
}
