//! Remote store adapter.
//!
//! Maps the logical key space of the shared realtime store onto a
//! [`KeyValueStore`]:
//!
//! ```text
//! orgData/{projectId}      -> OrgTree
//! positions/{projectId}    -> id -> {x, y}
//! connections/{projectId}  -> [Connection]
//! settings/locked          -> bool
//! settings/activeProjectId -> string
//! ```

use crate::backend::{KeyValueStore, PositionStore, RemoteAdapter, TreeStore};
use crate::error::{StoreError, StoreResult};
use orgsync_core::{Connection, OrgTree, PositionMap};
use serde_json::Value;

/// Key paths of the realtime store.
pub mod paths {
    /// Lock flag shared by all clients.
    pub const SETTINGS_LOCKED: &str = "settings/locked";
    /// Project currently selected by clients.
    pub const SETTINGS_ACTIVE_PROJECT: &str = "settings/activeProjectId";

    /// Tree of a project.
    pub fn org_data(project_id: &str) -> String {
        format!("orgData/{project_id}")
    }

    /// Position map of a project.
    pub fn positions(project_id: &str) -> String {
        format!("positions/{project_id}")
    }

    /// Connection list of a project.
    pub fn connections(project_id: &str) -> String {
        format!("connections/{project_id}")
    }
}

/// Characters the realtime store rejects in a key.
const FORBIDDEN_KEY_CHARS: [char; 6] = ['.', '#', '$', '[', ']', '/'];

/// Checks that `project_id` can be used as a single key path segment.
pub fn validate_project_id(project_id: &str) -> StoreResult<()> {
    if project_id.is_empty() {
        return Err(StoreError::InvalidPath("empty project id".into()));
    }
    if let Some(c) = project_id.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c)) {
        return Err(StoreError::InvalidPath(format!(
            "project id {project_id:?} contains {c:?}"
        )));
    }
    Ok(())
}

/// Reads the active project id from the settings branch.
pub fn read_active_project<K: KeyValueStore>(kv: &K) -> StoreResult<Option<String>> {
    Ok(kv
        .get(paths::SETTINGS_ACTIVE_PROJECT)?
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.is_empty()))
}

/// The realtime store, scoped to one project.
#[derive(Debug, Clone)]
pub struct RemoteStore<K: KeyValueStore> {
    kv: K,
    project_id: String,
}

impl<K: KeyValueStore> RemoteStore<K> {
    /// Creates an adapter for `project_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPath`] if the id is not a valid key.
    pub fn new(kv: K, project_id: impl Into<String>) -> StoreResult<Self> {
        let project_id = project_id.into();
        validate_project_id(&project_id)?;
        Ok(Self { kv, project_id })
    }

    /// The underlying key-value store.
    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Sets the shared lock flag.
    pub fn set_locked(&self, locked: bool) -> StoreResult<()> {
        self.kv.set(paths::SETTINGS_LOCKED, &Value::Bool(locked))
    }
}

impl<K: KeyValueStore> TreeStore for RemoteStore<K> {
    fn describe(&self) -> String {
        format!("remote {}", paths::org_data(&self.project_id))
    }

    fn read_tree(&self) -> StoreResult<Option<Value>> {
        self.kv.get(&paths::org_data(&self.project_id))
    }

    fn write_tree(&self, tree: &OrgTree) -> StoreResult<()> {
        let value = serde_json::to_value(tree)?;
        self.kv.set(&paths::org_data(&self.project_id), &value)
    }
}

impl<K: KeyValueStore> PositionStore for RemoteStore<K> {
    fn read_positions(&self) -> StoreResult<Option<Value>> {
        self.kv.get(&paths::positions(&self.project_id))
    }

    fn write_positions(&self, positions: &PositionMap) -> StoreResult<()> {
        let value = serde_json::to_value(positions)?;
        self.kv.set(&paths::positions(&self.project_id), &value)
    }
}

impl<K: KeyValueStore> RemoteAdapter for RemoteStore<K> {
    fn read_connections(&self) -> StoreResult<Option<Value>> {
        self.kv.get(&paths::connections(&self.project_id))
    }

    fn write_connections(&self, connections: &[Connection]) -> StoreResult<()> {
        let value = serde_json::to_value(connections)?;
        self.kv.set(&paths::connections(&self.project_id), &value)
    }

    fn is_locked(&self) -> StoreResult<bool> {
        Ok(self
            .kv
            .get(paths::SETTINGS_LOCKED)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    fn active_project(&self) -> StoreResult<Option<String>> {
        read_active_project(&self.kv)
    }

    fn project_id(&self) -> &str {
        &self.project_id
    }
}
