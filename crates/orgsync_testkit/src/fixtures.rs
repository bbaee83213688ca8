//! Test fixtures and store helpers.
//!
//! Provides sample trees, legacy encodings of them, and a temporary
//! workspace wiring a snapshot file to an in-memory remote store.

use orgsync_core::{normalize, CollectionKind, OrgTree, Person, Position, PositionMap, Unit};
use orgsync_store::{paths, MemoryKeyValueStore, RemoteStore, SnapshotFile, TreeStore};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Project id used by fixtures.
pub const TEST_PROJECT: &str = "test-project";

/// A small tree touching every collection.
///
/// Contains positioned units, a unit with nested sub-units and people
/// (so it has a detail node), and an unpositioned unit.
pub fn sample_tree() -> OrgTree {
    let mut tree = OrgTree::new();
    tree.coordinators
        .push(Unit::new("coord-1", "Coordinator").with_position(Position::new(10.0, 20.0)));
    tree.executives.push(
        Unit::new("exec-1", "Executive Board")
            .with_position(Position::new(300.0, 0.0))
            .with_sub_unit(
                Unit::new("exec-1-legal", "Legal").with_position(Position::new(300.0, 400.0)),
            )
            .with_person(Person::new("p-ana", "Ana Ruiz", "Chair")),
    );
    tree.main_coordinators
        .push(Unit::new("main-1", "Main Coordination").with_position(Position::new(-50.0, 80.0)));
    tree.management.push(Unit::new("mgmt-1", "Management"));
    tree.city_personnel.push(
        Unit::new("city-1", "City Office")
            .with_position(Position::new(0.0, 600.0))
            .with_person(Person::new("p-li", "Li Wei", "Clerk")),
    );
    tree
}

/// A tree with `n` positioned coordinators, `c0`..`c{n-1}`.
pub fn coordinators_tree(n: usize) -> OrgTree {
    let mut tree = OrgTree::new();
    for i in 0..n {
        tree.coordinators.push(
            Unit::new(format!("c{i}"), format!("Coordinator {i}"))
                .with_position(Position::new(i as f64 * 100.0, 0.0)),
        );
    }
    tree
}

/// Builds a position map from `(id, x, y)` triples.
pub fn positions(entries: &[(&str, f64, f64)]) -> PositionMap {
    entries
        .iter()
        .map(|(id, x, y)| (id.to_string(), Position::new(*x, *y)))
        .collect()
}

/// Re-encodes every top-level collection as a keyed mapping.
///
/// Keys are `k0`, `k1`, ... in sequence order, as a store that does not
/// preserve array identity would write them.
pub fn keyed_encoding(tree: &OrgTree) -> Value {
    let mut value = serde_json::to_value(tree).unwrap_or(Value::Null);
    if let Some(root) = value.as_object_mut() {
        for kind in CollectionKind::ALL {
            if let Some(Value::Array(items)) = root.remove(kind.key()) {
                root.insert(kind.key().to_string(), keyed(items));
            }
        }
    }
    value
}

/// Turns a sequence into a keyed mapping with `k{index}` keys.
pub fn keyed(items: Vec<Value>) -> Value {
    let map: Map<String, Value> = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| (format!("k{i}"), item))
        .collect();
    Value::Object(map)
}

/// A temporary snapshot directory plus an in-memory remote store.
pub struct TestWorkspace {
    /// Shared remote key-value store.
    pub kv: MemoryKeyValueStore,
    dir: TempDir,
}

impl TestWorkspace {
    /// Creates an empty workspace.
    pub fn new() -> Self {
        Self {
            kv: MemoryKeyValueStore::new(),
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Root of the temporary directory.
    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Path of the canonical snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.path().join("data").join("orgData.json")
    }

    /// Path of the local cache loader.
    pub fn cache_path(&self) -> PathBuf {
        self.dir.path().join("public").join("orgDataLoader.js")
    }

    /// Remote adapter for [`TEST_PROJECT`], sharing [`Self::kv`].
    pub fn remote(&self) -> RemoteStore<MemoryKeyValueStore> {
        RemoteStore::new(self.kv.clone(), TEST_PROJECT).expect("Invalid test project id")
    }

    /// Seeds the remote tree with a raw payload.
    pub fn seed_remote_tree(&self, payload: Value) {
        self.kv.seed(paths::org_data(TEST_PROJECT), payload);
    }

    /// Seeds the remote position map with a raw payload.
    pub fn seed_remote_positions(&self, payload: Value) {
        self.kv.seed(paths::positions(TEST_PROJECT), payload);
    }

    /// Raw remote tree.
    pub fn remote_tree(&self) -> Option<Value> {
        self.remote().read_tree().expect("Failed to read remote tree")
    }

    /// Writes the canonical snapshot directly, bypassing backups.
    pub fn write_snapshot(&self, tree: &OrgTree) {
        SnapshotFile::new(self.snapshot_path())
            .write_tree(tree)
            .expect("Failed to write snapshot");
    }

    /// Reads and normalizes the canonical snapshot.
    pub fn read_snapshot(&self) -> Option<OrgTree> {
        SnapshotFile::new(self.snapshot_path())
            .read_tree()
            .expect("Failed to read snapshot")
            .map(|raw| normalize(raw).expect("Snapshot is malformed"))
    }

    /// Raw bytes of the canonical snapshot.
    pub fn snapshot_bytes(&self) -> Option<Vec<u8>> {
        fs::read(self.snapshot_path()).ok()
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
