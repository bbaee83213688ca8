//! # orgsync engine
//!
//! Directional sync orchestrator for the org-chart dataset.
//!
//! This crate provides:
//! - The four transfer operations (pull/push of tree and positions)
//! - Local cache export, tree import and backup restore
//! - A per-transfer state machine with post-write verification
//! - Transfer reports and accumulated statistics
//!
//! ## Ordering discipline
//!
//! Every transfer flows source store -> normalizer -> (reconciler) ->
//! (backup, when the destination is the canonical snapshot) -> destination.
//!
//! ## Key Invariants
//!
//! - No canonical snapshot write happens without a completed backup
//! - A failed backup aborts the transfer before any write
//! - Position pushes merge; they never erase remote-only entries
//! - Tree pushes replace the remote tree and need explicit confirmation
//! - Verification mismatches are reported, never rolled back
//! - Nothing is retried: every error is fatal to the transfer

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod report;
mod state;

pub use config::{
    resolve_project_id, SyncConfig, DEFAULT_CACHE_PATH, DEFAULT_PROJECT_ID, DEFAULT_SNAPSHOT_PATH,
};
pub use error::{SyncError, SyncResult};
pub use report::{
    Operation, StatusReport, TransferReport, TransferState, Verification, VerificationMismatch,
};
pub use state::{PushConfirmation, SyncOrchestrator, SyncStats};
