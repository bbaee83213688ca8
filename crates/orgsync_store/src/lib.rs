//! # orgsync store
//!
//! Store adapters for the org-chart sync engine.
//!
//! Three stores hold copies of the same data and are kept consistent by
//! the engine:
//!
//! - [`SnapshotFile`] - the canonical snapshot, one JSON file per deployment
//! - [`RemoteStore`] - the shared realtime store, namespaced by project
//! - [`LocalCacheArtifact`] - the loader script that fills browser-local caches
//!
//! Adapters are thin: they read raw payloads and write whole values. They
//! never merge, normalize or back up; that belongs to the engine.
//!
//! ## Example
//!
//! ```rust
//! use orgsync_store::{MemoryKeyValueStore, RemoteStore, TreeStore};
//!
//! let remote = RemoteStore::new(MemoryKeyValueStore::new(), "default").unwrap();
//! assert!(remote.read_tree().unwrap().is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod error;
mod http;
mod local_cache;
mod memory;
mod remote;
mod snapshot;

pub use backend::{KeyValueStore, PositionStore, RemoteAdapter, TreeStore};
pub use config::RemoteConfig;
pub use error::{StoreError, StoreResult};
pub use http::{HttpClient, HttpKeyValueStore, HttpResponse};
pub use local_cache::{storage_key, LocalCacheArtifact};
pub use memory::MemoryKeyValueStore;
pub use remote::{paths, read_active_project, validate_project_id, RemoteStore};
pub use snapshot::SnapshotFile;
