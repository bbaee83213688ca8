//! Store adapter traits.

use crate::error::StoreResult;
use orgsync_core::{Connection, OrgTree, PositionMap};
use serde_json::Value;
use std::sync::Arc;

/// A store holding a whole-tree value.
///
/// Reads return the raw decoded payload: shape coercion is the
/// normalizer's job, applied by the caller right at the boundary.
/// `Ok(None)` means the store holds no tree at all.
pub trait TreeStore: Send + Sync {
    /// Human-readable location, for logs and reports.
    fn describe(&self) -> String;

    /// Reads the raw tree payload.
    fn read_tree(&self) -> StoreResult<Option<Value>>;

    /// Replaces the stored tree.
    fn write_tree(&self, tree: &OrgTree) -> StoreResult<()>;
}

/// A store holding a whole position map.
pub trait PositionStore: Send + Sync {
    /// Reads the raw position map payload.
    fn read_positions(&self) -> StoreResult<Option<Value>>;

    /// Replaces the stored position map.
    fn write_positions(&self, positions: &PositionMap) -> StoreResult<()>;
}

/// The shared realtime store, scoped to one project.
pub trait RemoteAdapter: TreeStore + PositionStore {
    /// Reads the raw connection list payload.
    fn read_connections(&self) -> StoreResult<Option<Value>>;

    /// Replaces the connection list.
    fn write_connections(&self, connections: &[Connection]) -> StoreResult<()>;

    /// Whether clients have locked the chart against edits.
    fn is_locked(&self) -> StoreResult<bool>;

    /// The project currently selected by clients.
    fn active_project(&self) -> StoreResult<Option<String>>;

    /// The project this adapter is scoped to.
    fn project_id(&self) -> &str;
}

/// A path-addressed JSON key-value store.
///
/// # Invariants
///
/// - `get` of a path never written returns `Ok(None)`
/// - `set` replaces the whole value at `path`
/// - No locking or transactions: concurrent writers race, last write wins
pub trait KeyValueStore: Send + Sync {
    /// Reads the value at `path`.
    fn get(&self, path: &str) -> StoreResult<Option<Value>>;

    /// Writes `value` at `path`.
    fn set(&self, path: &str, value: &Value) -> StoreResult<()>;
}

impl<K: KeyValueStore + ?Sized> KeyValueStore for Arc<K> {
    fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        (**self).get(path)
    }

    fn set(&self, path: &str, value: &Value) -> StoreResult<()> {
        (**self).set(path, value)
    }
}

impl<K: KeyValueStore + ?Sized> KeyValueStore for &K {
    fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        (**self).get(path)
    }

    fn set(&self, path: &str, value: &Value) -> StoreResult<()> {
        (**self).set(path, value)
    }
}
