//! Integration tests for the sync orchestrator against a snapshot file and
//! an in-memory remote store.

use orgsync_core::{
    extract_positions, normalize, Connection, CoreError, OrgTree, Position, PositionMap,
    RetentionPolicy, Unit,
};
use orgsync_engine::{
    Operation, PushConfirmation, SyncConfig, SyncError, SyncOrchestrator, TransferState,
    Verification,
};
use orgsync_store::{
    paths, LocalCacheArtifact, MemoryKeyValueStore, PositionStore, RemoteAdapter, RemoteStore,
    StoreResult, TreeStore,
};
use orgsync_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::fs;

fn config(ws: &TestWorkspace) -> SyncConfig {
    SyncConfig::new("memory://")
        .with_project_id(TEST_PROJECT)
        .with_snapshot_path(ws.snapshot_path())
        .with_cache_path(ws.cache_path())
}

fn orchestrator(ws: &TestWorkspace) -> SyncOrchestrator<RemoteStore<MemoryKeyValueStore>> {
    SyncOrchestrator::new(&config(ws), ws.remote())
}

fn remote_positions(ws: &TestWorkspace) -> PositionMap {
    let raw = ws.remote().read_positions().unwrap().unwrap();
    orgsync_core::normalize_positions(raw).unwrap()
}

#[test]
fn push_positions_canonical_wins_and_remote_only_survives() {
    let ws = TestWorkspace::new();
    let mut tree = OrgTree::new();
    tree.coordinators
        .push(Unit::new("a", "A").with_position(Position::new(10.0, 20.0)));
    ws.write_snapshot(&tree);
    ws.seed_remote_positions(json!({"a": {"x": 50, "y": 20}, "b": {"x": 0, "y": 0}}));

    let report = orchestrator(&ws).push_positions(false).unwrap();
    assert_eq!(report.changed_ids, vec!["a"]);
    assert_eq!(report.verification, Verification::Passed);
    assert_eq!(
        remote_positions(&ws),
        positions(&[("a", 10.0, 20.0), ("b", 0.0, 0.0)])
    );
}

#[test]
fn push_positions_twice_writes_once() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&sample_tree());
    let orchestrator = orchestrator(&ws);

    let first = orchestrator.push_positions(false).unwrap();
    assert!(first.written);
    assert_eq!(ws.kv.write_count(), 1);

    let second = orchestrator.push_positions(false).unwrap();
    assert!(second.is_noop());
    assert_eq!(ws.kv.write_count(), 1);
}

#[test]
fn pull_tree_converts_keyed_collections_in_key_order() {
    let ws = TestWorkspace::new();
    ws.seed_remote_tree(json!({
        "coordinators": {
            "x2": {"id": "second", "title": "Second"},
            "x1": {"id": "first", "title": "First"}
        }
    }));

    let report = orchestrator(&ws).pull_tree(false).unwrap();
    assert!(report.written);

    let raw: Value = serde_json::from_slice(&ws.snapshot_bytes().unwrap()).unwrap();
    assert!(raw["coordinators"].is_array());
    let ids: Vec<&str> = raw["coordinators"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["second", "first"]);
    assert_eq!(raw["executives"], json!([]));
}

#[test]
fn pull_tree_from_empty_remote_writes_nothing() {
    let ws = TestWorkspace::new();
    let orchestrator = orchestrator(&ws);

    let err = orchestrator.pull_tree(false).unwrap_err();
    assert!(matches!(err, SyncError::NoRemoteData { ref path } if path == "orgData/test-project"));
    assert!(ws.snapshot_bytes().is_none());
    assert!(orchestrator.list_backups().unwrap().is_empty());
    assert_eq!(ws.kv.write_count(), 0);
}

#[test]
fn pull_tree_backs_up_previous_snapshot() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&coordinators_tree(1));
    let before = ws.snapshot_bytes().unwrap();
    ws.seed_remote_tree(keyed_encoding(&sample_tree()));

    let report = orchestrator(&ws).pull_tree(false).unwrap();
    let backup = report.backup.expect("backup taken");
    assert_eq!(fs::read(&backup.path).unwrap(), before);
    assert!(backup
        .path
        .to_string_lossy()
        .contains("orgData.json.backup."));
    assert_eq!(ws.read_snapshot(), Some(sample_tree()));
}

#[test]
fn failed_backup_leaves_snapshot_untouched() {
    let ws = TestWorkspace::new();
    // a directory where the snapshot should be cannot be copied
    fs::create_dir_all(ws.snapshot_path()).unwrap();
    ws.seed_remote_tree(json!({"coordinators": [{"id": "a"}]}));

    let orchestrator = orchestrator(&ws);
    let err = orchestrator.pull_tree(false).unwrap_err();
    assert!(matches!(err, SyncError::Core(CoreError::BackupWrite { .. })));
    assert!(ws.snapshot_path().is_dir());
    assert_eq!(orchestrator.state(), TransferState::Failed);
}

#[test]
fn held_snapshot_lock_aborts_pull() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&coordinators_tree(2));
    ws.seed_remote_tree(json!({"coordinators": []}));
    let orchestrator = orchestrator(&ws);

    let _guard = orchestrator.backups().begin_write().unwrap();
    let err = orchestrator.pull_tree(false).unwrap_err();
    assert!(matches!(err, SyncError::Core(CoreError::SnapshotLocked(_))));
    assert_eq!(ws.read_snapshot(), Some(coordinators_tree(2)));
}

#[test]
fn pull_positions_applies_only_changed_ids() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&sample_tree());
    ws.seed_remote_positions(json!({
        "coord-1": {"x": 10, "y": 20},
        "main-1": {"x": 1, "y": 2},
        "exec-1-detail": {"x": 999, "y": 999},
        "gone": {"x": 5, "y": 5}
    }));

    let report = orchestrator(&ws).pull_positions(false).unwrap();
    assert_eq!(report.changed_ids, vec!["main-1"]);
    assert_eq!(report.orphaned_positions, vec!["gone"]);
    assert!(report.backup.is_some());

    let tree = ws.read_snapshot().unwrap();
    assert_eq!(tree.main_coordinators[0].position, Some(Position::new(1.0, 2.0)));
    // detail positions are derived, never written back
    assert_eq!(tree.executives[0].position, Some(Position::new(300.0, 0.0)));
}

#[test]
fn pull_positions_requires_remote_positions() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&sample_tree());
    let err = orchestrator(&ws).pull_positions(false).unwrap_err();
    assert!(matches!(err, SyncError::NoRemotePositions { .. }));
}

#[test]
fn push_tree_needs_confirmation_and_respects_lock() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&sample_tree());
    let orchestrator = orchestrator(&ws);

    assert!(matches!(
        orchestrator.push_tree(PushConfirmation::Unconfirmed, false),
        Err(SyncError::ConfirmationRequired)
    ));

    ws.remote().set_locked(true).unwrap();
    let writes = ws.kv.write_count();
    assert!(matches!(
        orchestrator.push_tree(PushConfirmation::Confirmed, false),
        Err(SyncError::RemoteLocked { .. })
    ));
    assert!(matches!(
        orchestrator.push_positions(false),
        Err(SyncError::RemoteLocked { .. })
    ));
    assert_eq!(ws.kv.write_count(), writes);
    assert!(ws.remote_tree().is_none());
}

#[test]
fn disabled_lock_check_writes_anyway() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&sample_tree());
    ws.remote().set_locked(true).unwrap();

    let config = config(&ws).with_respect_remote_lock(false);
    let orchestrator = SyncOrchestrator::new(&config, ws.remote());
    let report = orchestrator
        .push_tree(PushConfirmation::Confirmed, false)
        .unwrap();
    assert!(report.written);
    assert_eq!(
        normalize(ws.remote_tree().unwrap()).unwrap(),
        sample_tree()
    );
}

/// A remote that silently drops the last coordinator on every tree write.
/// Remote that rewrites trees before storing them; `None` stores nothing.
struct RewritingRemote {
    inner: RemoteStore<MemoryKeyValueStore>,
    rewrite: fn(&OrgTree) -> Option<OrgTree>,
}

impl RewritingRemote {
    /// Loses the last coordinator of every write.
    fn lossy(inner: RemoteStore<MemoryKeyValueStore>) -> Self {
        Self {
            inner,
            rewrite: |tree| {
                let mut lossy = tree.clone();
                lossy.coordinators.pop();
                Some(lossy)
            },
        }
    }

    /// Drops empty trees, like realtime stores that never keep empty containers.
    fn dropping_empty(inner: RemoteStore<MemoryKeyValueStore>) -> Self {
        Self {
            inner,
            rewrite: |tree| (!tree.is_empty()).then(|| tree.clone()),
        }
    }
}

impl TreeStore for RewritingRemote {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn read_tree(&self) -> StoreResult<Option<Value>> {
        self.inner.read_tree()
    }

    fn write_tree(&self, tree: &OrgTree) -> StoreResult<()> {
        match (self.rewrite)(tree) {
            Some(stored) => self.inner.write_tree(&stored),
            None => Ok(()),
        }
    }
}

impl PositionStore for RewritingRemote {
    fn read_positions(&self) -> StoreResult<Option<Value>> {
        self.inner.read_positions()
    }

    fn write_positions(&self, positions: &PositionMap) -> StoreResult<()> {
        self.inner.write_positions(positions)
    }
}

impl RemoteAdapter for RewritingRemote {
    fn read_connections(&self) -> StoreResult<Option<Value>> {
        self.inner.read_connections()
    }

    fn write_connections(&self, connections: &[Connection]) -> StoreResult<()> {
        self.inner.write_connections(connections)
    }

    fn is_locked(&self) -> StoreResult<bool> {
        self.inner.is_locked()
    }

    fn active_project(&self) -> StoreResult<Option<String>> {
        self.inner.active_project()
    }

    fn project_id(&self) -> &str {
        self.inner.project_id()
    }
}

#[test]
fn verification_mismatch_is_reported_not_fatal() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&coordinators_tree(3));
    let orchestrator = SyncOrchestrator::new(&config(&ws), RewritingRemote::lossy(ws.remote()));

    let report = orchestrator
        .push_tree(PushConfirmation::Confirmed, false)
        .unwrap();
    assert_eq!(report.state, TransferState::Done);
    let mismatch = report.verification.mismatch().expect("mismatch reported");
    assert!(mismatch.expected.contains("coordinators=3"));
    assert!(mismatch.actual.contains("coordinators=2"));
    assert_eq!(orchestrator.stats().verification_mismatches, 1);
}

#[test]
fn empty_tree_that_reads_back_absent_verifies() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&OrgTree::new());
    let orchestrator =
        SyncOrchestrator::new(&config(&ws), RewritingRemote::dropping_empty(ws.remote()));

    let report = orchestrator
        .push_tree(PushConfirmation::Confirmed, false)
        .unwrap();
    assert!(report.written);
    assert_eq!(report.verification, Verification::Passed);
    assert!(ws.remote_tree().is_none());
    assert_eq!(orchestrator.stats().verification_mismatches, 0);
}

#[test]
fn export_cache_writes_loader_for_project() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&sample_tree());
    let cache = LocalCacheArtifact::new(ws.cache_path(), TEST_PROJECT);

    let report = orchestrator(&ws).export_cache(&cache).unwrap();
    assert_eq!(report.operation, Operation::ExportCache);
    assert_eq!(report.verification, Verification::Passed);

    let script = fs::read_to_string(ws.cache_path()).unwrap();
    assert!(script.contains("\"orgData_test-project\""));
    assert_eq!(
        normalize(cache.read_tree().unwrap().unwrap()).unwrap(),
        sample_tree()
    );
}

#[test]
fn import_rejects_duplicate_ids() {
    let ws = TestWorkspace::new();
    let payload = json!({
        "coordinators": [{"id": "dup"}],
        "management": [{"id": "dup"}]
    });
    let err = orchestrator(&ws).import_tree(payload, false).unwrap_err();
    assert!(matches!(err, SyncError::Core(CoreError::MalformedTree { .. })));
    assert!(ws.snapshot_bytes().is_none());
}

#[test]
fn import_then_restore_previous_version() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&coordinators_tree(1));
    let orchestrator = orchestrator(&ws);

    let report = orchestrator
        .import_tree(keyed_encoding(&sample_tree()), false)
        .unwrap();
    let backup = report.backup.unwrap();
    assert_eq!(ws.read_snapshot(), Some(sample_tree()));

    let restored = orchestrator.restore_backup(&backup.path).unwrap();
    assert_eq!(restored.verification, Verification::Passed);
    assert_eq!(ws.read_snapshot(), Some(coordinators_tree(1)));
    // the restore itself backed up the imported tree
    assert_eq!(orchestrator.list_backups().unwrap().len(), 2);
}

#[test]
fn restore_of_missing_backup_fails() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&coordinators_tree(1));
    let missing = ws.root().join("data/orgData.json.backup.1");
    let err = orchestrator(&ws).restore_backup(&missing).unwrap_err();
    assert!(matches!(err, SyncError::Core(CoreError::BackupNotFound(_))));
}

#[test]
fn prune_keeps_newest_backups() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&coordinators_tree(1));
    let orchestrator = orchestrator(&ws);
    for n in 2..6 {
        orchestrator
            .import_tree(serde_json::to_value(coordinators_tree(n)).unwrap(), false)
            .unwrap();
    }
    assert_eq!(orchestrator.list_backups().unwrap().len(), 4);

    assert!(orchestrator
        .prune_backups(&RetentionPolicy::KeepAll)
        .unwrap()
        .is_empty());
    let removed = orchestrator
        .prune_backups(&RetentionPolicy::KeepLast(1))
        .unwrap();
    assert_eq!(removed.len(), 3);

    let left = orchestrator.list_backups().unwrap();
    assert_eq!(left.len(), 1);
    let kept = normalize(serde_json::from_slice(&fs::read(&left[0].path).unwrap()).unwrap());
    assert_eq!(kept.unwrap(), coordinators_tree(4));
}

#[test]
fn status_summarizes_both_sides() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&sample_tree());
    let mut remote_tree = sample_tree();
    remote_tree.coordinators.clear();
    ws.seed_remote_tree(serde_json::to_value(&remote_tree).unwrap());
    ws.seed_remote_positions(json!({"coord-1": {"x": 0, "y": 0}, "ghost": {"x": 1, "y": 1}}));
    ws.kv.seed(
        paths::connections(TEST_PROJECT),
        json!([{"source": "coord-1", "target": "exec-1"}, {"source": "coord-1", "target": "nobody"}]),
    );
    ws.kv.seed(paths::SETTINGS_ACTIVE_PROJECT, json!("other"));

    let status = orchestrator(&ws).status().unwrap();
    assert_eq!(status.project_id, TEST_PROJECT);
    assert_eq!(status.active_project.as_deref(), Some("other"));
    assert_eq!(status.remote_positions, Some(2));
    assert_eq!(status.remote_connections, Some(2));
    assert_eq!(status.diverging_collections(), vec!["coordinators"]);
    assert_eq!(status.validation.orphaned_positions, vec!["ghost"]);
    assert_eq!(
        status.validation.dangling_connections,
        vec![("coord-1".to_string(), "nobody".to_string())]
    );
    assert_eq!(ws.kv.write_count(), 0);
}

#[test]
fn dry_runs_touch_nothing() {
    let ws = TestWorkspace::new();
    ws.write_snapshot(&coordinators_tree(1));
    let before = ws.snapshot_bytes();
    ws.seed_remote_tree(keyed_encoding(&sample_tree()));
    let orchestrator = orchestrator(&ws);

    let report = orchestrator.pull_tree(true).unwrap();
    assert!(report.dry_run && !report.written);
    assert!(!report.trace.contains(&TransferState::BackingUp));
    assert_eq!(report.counts.unwrap().total(), 5);

    orchestrator.push_positions(true).unwrap();
    assert_eq!(ws.snapshot_bytes(), before);
    assert!(orchestrator.list_backups().unwrap().is_empty());
    assert_eq!(ws.kv.write_count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn pushed_positions_cover_the_tree(tree in org_tree_strategy()) {
        let ws = TestWorkspace::new();
        ws.write_snapshot(&tree);
        let orchestrator = orchestrator(&ws);
        orchestrator.push_positions(false).unwrap();

        let expected = extract_positions(&tree);
        let pushed = ws
            .remote()
            .read_positions()
            .unwrap()
            .map(|raw| orgsync_core::normalize_positions(raw).unwrap())
            .unwrap_or_default();
        prop_assert_eq!(pushed, expected);
    }

    #[test]
    fn pull_after_push_changes_nothing(tree in org_tree_strategy()) {
        let ws = TestWorkspace::new();
        ws.write_snapshot(&tree);
        let orchestrator = orchestrator(&ws);
        orchestrator.push_positions(false).unwrap();
        ws.seed_remote_positions(serde_json::to_value(extract_positions(&tree)).unwrap());

        let report = orchestrator.pull_positions(false).unwrap();
        prop_assert!(report.changed_ids.is_empty());
        prop_assert_eq!(ws.read_snapshot(), Some(tree));
    }
}
