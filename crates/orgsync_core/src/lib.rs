//! # orgsync core
//!
//! Data model and pure transforms for the org-chart sync engine.
//!
//! This crate provides:
//! - The canonical [`OrgTree`] model (units, people, positions, connections)
//! - The schema normalizer for legacy sequence/keyed-mapping encodings
//! - The position reconciler (extract, apply, reconcile)
//! - Fail-closed, timestamped backups of the canonical snapshot
//! - Consistency checks (duplicate ids, orphaned positions, dangling links)
//!
//! ## Key Invariants
//!
//! - Every collection is an ordered sequence after normalization
//! - Normalization is idempotent
//! - Detail-node positions are derived one way: tree → position map
//! - No snapshot write happens without a completed backup

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backup;
mod error;
mod model;
pub mod normalize;
pub mod positions;
pub mod validate;

pub use backup::{BackupManager, BackupRecord, RetentionPolicy, SnapshotWriteGuard};
pub use error::{CoreError, CoreResult};
pub use model::{
    CollectionCounts, CollectionKind, Connection, OrgTree, Person, Position, PositionMap, Unit,
};
pub use normalize::{normalize, normalize_connections, normalize_positions, normalize_str};
pub use positions::{
    apply_positions, apply_positions_in_place, extract_positions, reconcile, PositionChange,
};
pub use validate::{validate, ValidationReport};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
