//! Error types for store adapters.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A core operation (atomic write, normalization) failed.
    #[error(transparent)]
    Core(#[from] orgsync_core::CoreError),

    /// The remote store could not be reached or answered with an error.
    #[error("transport error: {url}: {message}")]
    Transport {
        /// Request URL, without credentials.
        url: String,
        /// Error message.
        message: String,
    },

    /// A key path component is not acceptable to the remote store.
    #[error("invalid key path: {0}")]
    InvalidPath(String),

    /// A stored artifact could not be interpreted.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Creates a transport error.
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }
}
