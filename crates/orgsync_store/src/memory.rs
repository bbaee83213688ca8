//! In-memory key-value store for testing.

use crate::backend::KeyValueStore;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    values: RwLock<BTreeMap<String, Value>>,
    writes: AtomicU64,
    offline: AtomicBool,
}

/// An in-memory [`KeyValueStore`].
///
/// Clones share the same data, so a test can hand one clone to the engine
/// and inspect another.
///
/// # Example
///
/// ```rust
/// use orgsync_store::{KeyValueStore, MemoryKeyValueStore};
/// use serde_json::json;
///
/// let store = MemoryKeyValueStore::new();
/// store.set("settings/locked", &json!(true)).unwrap();
/// assert_eq!(store.get("settings/locked").unwrap(), Some(json!(true)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    inner: Arc<Inner>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a value without counting it as a write.
    pub fn seed(&self, path: impl Into<String>, value: Value) {
        self.inner.values.write().insert(path.into(), value);
    }

    /// Number of successful `set` calls.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Simulates a network outage: every call fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// All stored paths.
    pub fn paths(&self) -> Vec<String> {
        self.inner.values.read().keys().cloned().collect()
    }

    fn check_online(&self, path: &str) -> StoreResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(StoreError::transport(format!("memory://{path}"), "store offline"))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        self.check_online(path)?;
        Ok(self
            .inner
            .values
            .read()
            .get(path)
            .filter(|v| !v.is_null())
            .cloned())
    }

    fn set(&self, path: &str, value: &Value) -> StoreResult<()> {
        self.check_online(path)?;
        let mut values = self.inner.values.write();
        if value.is_null() {
            values.remove(path);
        } else {
            values.insert(path.to_string(), value.clone());
        }
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
