//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use orgsync_core::RetentionPolicy;
use orgsync_store::{read_active_project, KeyValueStore, RemoteConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project used when neither the configuration nor the remote settings name one.
pub const DEFAULT_PROJECT_ID: &str = "default";

/// Default location of the canonical snapshot.
pub const DEFAULT_SNAPSHOT_PATH: &str = "src/data/orgData.json";

/// Default location of the local cache loader artifact.
pub const DEFAULT_CACHE_PATH: &str = "public/orgDataLoader.js";

/// Configuration for sync operations.
///
/// Built once at process start and passed by reference to every adapter.
///
/// # Example
///
/// ```rust
/// use orgsync_engine::SyncConfig;
///
/// let config = SyncConfig::new("https://chart.example.com")
///     .with_project_id("p1")
///     .with_snapshot_path("data/orgData.json");
/// assert_eq!(config.project_id.as_deref(), Some("p1"));
/// assert!(config.verify_after_write);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Project to sync. Resolved from the remote settings when absent.
    pub project_id: Option<String>,
    /// Canonical snapshot file.
    pub snapshot_path: PathBuf,
    /// Generated local cache loader.
    pub cache_path: PathBuf,
    /// Remote store connection.
    pub remote: RemoteConfig,
    /// Re-read the destination after every write.
    pub verify_after_write: bool,
    /// Refuse remote writes while `settings/locked` is set.
    pub respect_remote_lock: bool,
    /// Keep only this many backups when pruning.
    pub keep_backups: Option<usize>,
    /// Keep only backups younger than this many days when pruning.
    pub max_backup_age_days: Option<u64>,
}

impl SyncConfig {
    /// Creates a configuration for the remote store at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            project_id: None,
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            remote: RemoteConfig::new(base_url),
            verify_after_write: true,
            respect_remote_lock: true,
            keep_backups: None,
            max_backup_age_days: None,
        }
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: &Path) -> SyncResult<Self> {
        let data = fs::read(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_slice(&data)
            .map_err(|e| SyncError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Sets the project id.
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Sets the snapshot path.
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    /// Sets the local cache artifact path.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    /// Sets the remote connection.
    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = remote;
        self
    }

    /// Enables or disables post-write verification.
    pub fn with_verify_after_write(mut self, verify: bool) -> Self {
        self.verify_after_write = verify;
        self
    }

    /// Enables or disables the remote lock check.
    pub fn with_respect_remote_lock(mut self, respect: bool) -> Self {
        self.respect_remote_lock = respect;
        self
    }

    /// Sets the retention policy used by backup pruning.
    pub fn with_retention(mut self, policy: RetentionPolicy) -> Self {
        self.keep_backups = None;
        self.max_backup_age_days = None;
        match policy {
            RetentionPolicy::KeepAll => {}
            RetentionPolicy::KeepLast(n) => self.keep_backups = Some(n),
            RetentionPolicy::MaxAge(age) => {
                self.max_backup_age_days = Some(age.as_secs() / SECS_PER_DAY)
            }
        }
        self
    }

    /// Retention policy derived from the pruning settings.
    ///
    /// `keep_backups` wins when both are set.
    pub fn retention(&self) -> RetentionPolicy {
        match (self.keep_backups, self.max_backup_age_days) {
            (Some(n), _) => RetentionPolicy::KeepLast(n),
            (None, Some(days)) => RetentionPolicy::max_age_days(days),
            (None, None) => RetentionPolicy::KeepAll,
        }
    }

    /// Checks the configuration before any store is touched.
    pub fn validate(&self) -> SyncResult<()> {
        if self.remote.base_url.trim().is_empty() {
            return Err(SyncError::Config("remote base URL is not set".into()));
        }
        self.validate_local()
    }

    /// Checks only the settings needed by snapshot-only operations
    /// (import, restore, backup housekeeping); the remote may be unset.
    pub fn validate_local(&self) -> SyncResult<()> {
        if self.snapshot_path.as_os_str().is_empty() {
            return Err(SyncError::Config("snapshot path is not set".into()));
        }
        if let Some(project_id) = &self.project_id {
            orgsync_store::validate_project_id(project_id)?;
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Determines the project to sync.
///
/// Order: the configured id, then the remote `settings/activeProjectId`,
/// then [`DEFAULT_PROJECT_ID`].
pub fn resolve_project_id<K: KeyValueStore>(kv: &K, configured: Option<&str>) -> SyncResult<String> {
    if let Some(project_id) = configured {
        return Ok(project_id.to_string());
    }
    let resolved = read_active_project(kv)?.unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string());
    debug!(project_id = %resolved, "resolved project from remote settings");
    Ok(resolved)
}
