//! Error types for orgsync core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in orgsync core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The normalizer could not interpret a collection or record.
    #[error("malformed tree: {collection}: {reason}")]
    MalformedTree {
        /// Collection (or nested collection path) that failed to decode.
        collection: String,
        /// Description of the problem.
        reason: String,
    },

    /// The pre-write copy of the canonical snapshot failed.
    #[error("backup of {} failed: {source}", snapshot.display())]
    BackupWrite {
        /// Snapshot that was being backed up.
        snapshot: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// Another process holds the snapshot write lock.
    #[error("snapshot locked: another process is writing {}", .0.display())]
    SnapshotLocked(PathBuf),

    /// A requested backup does not exist.
    #[error("backup not found: {}", .0.display())]
    BackupNotFound(PathBuf),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a malformed-tree error.
    pub fn malformed(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTree {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    /// Creates a backup-write error for the given snapshot.
    pub fn backup_write(snapshot: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::BackupWrite {
            snapshot: snapshot.into(),
            source,
        }
    }
}
