//! Canonical snapshot file adapter.

use crate::backend::TreeStore;
use crate::error::StoreResult;
use orgsync_core::backup::write_atomic;
use orgsync_core::OrgTree;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The file-backed authoritative copy of the tree.
///
/// One file per deployment: the snapshot is not namespaced by project.
/// Writes replace the file atomically; callers are expected to hold a
/// [`orgsync_core::SnapshotWriteGuard`] for the duration.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Creates an adapter for the snapshot at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl TreeStore for SnapshotFile {
    fn describe(&self) -> String {
        format!("snapshot {}", self.path.display())
    }

    fn read_tree(&self) -> StoreResult<Option<Value>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_slice(&data)?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    fn write_tree(&self, tree: &OrgTree) -> StoreResult<()> {
        let mut data = serde_json::to_vec_pretty(tree)?;
        data.push(b'\n');
        write_atomic(&self.path, &data)?;
        Ok(())
    }
}
