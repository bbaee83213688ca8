//! Canonical snapshot backups.
//!
//! Before the canonical snapshot is overwritten, its current content is
//! copied to an immutable sibling file:
//!
//! ```text
//! data/
//! ├─ orgData.json                        # canonical snapshot
//! ├─ orgData.json.lock                   # advisory write lock
//! ├─ orgData.json.backup.1718000000000   # append-only backups
//! └─ orgData.json.backup.1718000004211
//! ```
//!
//! Backup names carry a Unix timestamp in milliseconds that is strictly
//! increasing per snapshot. The copy is synchronous and fail-closed: if it
//! cannot be made, no write guard is handed out.
//!
//! ## Usage
//!
//! ```ignore
//! use orgsync_core::backup::BackupManager;
//!
//! let backups = BackupManager::new("data/orgData.json");
//! let guard = backups.begin_write()?;   // lock + backup
//! // ... write the snapshot ...
//! drop(guard);                          // lock released
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Infix between the snapshot file name and the timestamp.
const BACKUP_INFIX: &str = ".backup.";
/// Suffix of the advisory lock file.
const LOCK_SUFFIX: &str = ".lock";
/// Suffix of the temporary file used for atomic writes.
const TEMP_SUFFIX: &str = ".tmp";

/// A backup file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// Path of the backup file.
    pub path: PathBuf,
    /// Creation time (Unix milliseconds) encoded in the file name.
    pub timestamp_ms: u64,
    /// Size in bytes.
    pub size: u64,
}

/// Optional retention policy, applied only on explicit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    /// Never delete backups.
    #[default]
    KeepAll,
    /// Keep the newest `n` backups.
    KeepLast(usize),
    /// Keep backups younger than the given age.
    MaxAge(Duration),
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

impl RetentionPolicy {
    /// Keeps backups younger than `days` days; huge values saturate.
    pub fn max_age_days(days: u64) -> Self {
        RetentionPolicy::MaxAge(Duration::from_secs(days.saturating_mul(SECS_PER_DAY)))
    }

    /// Returns the backups this policy would remove, given the current time.
    ///
    /// `backups` must be sorted oldest first.
    pub fn select_expired<'a>(&self, backups: &'a [BackupRecord], now_ms: u64) -> Vec<&'a BackupRecord> {
        match self {
            RetentionPolicy::KeepAll => Vec::new(),
            RetentionPolicy::KeepLast(keep) => {
                let excess = backups.len().saturating_sub(*keep);
                backups.iter().take(excess).collect()
            }
            RetentionPolicy::MaxAge(age) => {
                let age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX);
                let cutoff = now_ms.saturating_sub(age_ms);
                backups.iter().filter(|b| b.timestamp_ms < cutoff).collect()
            }
        }
    }
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Writes `data` to `path` via a temporary sibling and a rename.
///
/// Readers never observe a partially written file.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp_path = with_suffix(path, TEMP_SUFFIX);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Manages backups of one canonical snapshot file.
#[derive(Debug, Clone)]
pub struct BackupManager {
    snapshot: PathBuf,
}

impl BackupManager {
    /// Creates a manager for the snapshot at `snapshot`.
    pub fn new(snapshot: impl Into<PathBuf>) -> Self {
        Self {
            snapshot: snapshot.into(),
        }
    }

    /// Path of the managed snapshot.
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot
    }

    /// Path of the backup that would carry `timestamp_ms`.
    pub fn backup_path(&self, timestamp_ms: u64) -> PathBuf {
        with_suffix(&self.snapshot, &format!("{BACKUP_INFIX}{timestamp_ms}"))
    }

    fn lock_path(&self) -> PathBuf {
        with_suffix(&self.snapshot, LOCK_SUFFIX)
    }

    fn directory(&self) -> PathBuf {
        match self.snapshot.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Lists existing backups, oldest first.
    pub fn list(&self) -> CoreResult<Vec<BackupRecord>> {
        let Some(name) = self.snapshot.file_name().and_then(|n| n.to_str()) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{name}{BACKUP_INFIX}");

        let dir = self.directory();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(timestamp_ms) = file_name
                .strip_prefix(&prefix)
                .and_then(|ts| ts.parse::<u64>().ok())
            else {
                continue;
            };
            backups.push(BackupRecord {
                path: entry.path(),
                timestamp_ms,
                size: entry.metadata()?.len(),
            });
        }

        backups.sort_by_key(|b| b.timestamp_ms);
        Ok(backups)
    }

    /// The newest backup, if any.
    pub fn latest(&self) -> CoreResult<Option<BackupRecord>> {
        Ok(self.list()?.pop())
    }

    fn next_timestamp(&self) -> CoreResult<u64> {
        let now = now_ms();
        Ok(match self.latest()? {
            Some(last) if last.timestamp_ms >= now => last.timestamp_ms + 1,
            _ => now,
        })
    }

    /// Copies the current snapshot to a new backup file.
    ///
    /// Returns `None` if there is no snapshot yet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BackupWrite`] if the copy cannot be completed.
    pub fn create_backup(&self) -> CoreResult<Option<BackupRecord>> {
        let data = match fs::read(&self.snapshot) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(snapshot = %self.snapshot.display(), "no snapshot yet, nothing to back up");
                return Ok(None);
            }
            Err(e) => return Err(CoreError::backup_write(&self.snapshot, e)),
        };

        let timestamp_ms = self.next_timestamp()?;
        let path = self.backup_path(timestamp_ms);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| CoreError::backup_write(&self.snapshot, e))?;
        if let Err(e) = file.write_all(&data).and_then(|()| file.sync_all()) {
            drop(file);
            // Never leave a truncated backup behind.
            let _ = fs::remove_file(&path);
            return Err(CoreError::backup_write(&self.snapshot, e));
        }

        info!(backup = %path.display(), bytes = data.len(), "snapshot backed up");
        Ok(Some(BackupRecord {
            path,
            timestamp_ms,
            size: data.len() as u64,
        }))
    }

    /// Acquires the snapshot write lock and backs up the current content.
    ///
    /// The returned guard must be held for the whole write.
    ///
    /// # Errors
    ///
    /// - [`CoreError::SnapshotLocked`] if another writer holds the lock
    /// - [`CoreError::BackupWrite`] if the backup copy fails
    pub fn begin_write(&self) -> CoreResult<SnapshotWriteGuard> {
        if let Some(parent) = self.snapshot.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::SnapshotLocked(self.snapshot.clone()));
        }

        let backup = self.create_backup()?;
        Ok(SnapshotWriteGuard {
            _lock_file: lock_file,
            backup,
        })
    }

    /// Replaces the snapshot with the content of a backup.
    ///
    /// The current snapshot is itself backed up first.
    pub fn restore(&self, backup: &Path) -> CoreResult<SnapshotWriteGuard> {
        let data = fs::read(backup).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CoreError::BackupNotFound(backup.to_path_buf()),
            _ => CoreError::Io(e),
        })?;

        let guard = self.begin_write()?;
        write_atomic(&self.snapshot, &data)?;
        info!(from = %backup.display(), "snapshot restored from backup");
        Ok(guard)
    }

    /// Deletes the backups selected by `policy`. Returns what was removed.
    pub fn prune(&self, policy: &RetentionPolicy) -> CoreResult<Vec<BackupRecord>> {
        self.prune_at(policy, now_ms())
    }

    /// Like [`Self::prune`], evaluated at a fixed time.
    pub fn prune_at(&self, policy: &RetentionPolicy, now_ms: u64) -> CoreResult<Vec<BackupRecord>> {
        let backups = self.list()?;
        let expired: Vec<BackupRecord> = policy
            .select_expired(&backups, now_ms)
            .into_iter()
            .cloned()
            .collect();

        for backup in &expired {
            fs::remove_file(&backup.path)?;
            debug!(backup = %backup.path.display(), "backup pruned");
        }
        Ok(expired)
    }
}

/// Exclusive permission to write the canonical snapshot.
///
/// Holds the advisory lock until dropped.
#[derive(Debug)]
pub struct SnapshotWriteGuard {
    _lock_file: File,
    backup: Option<BackupRecord>,
}

impl SnapshotWriteGuard {
    /// The backup taken when the guard was acquired.
    pub fn backup(&self) -> Option<&BackupRecord> {
        self.backup.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BackupManager) {
        let dir = TempDir::new().unwrap();
        let manager = BackupManager::new(dir.path().join("orgData.json"));
        (dir, manager)
    }

    #[test]
    fn no_snapshot_means_no_backup() {
        let (_dir, manager) = setup();
        assert!(manager.create_backup().unwrap().is_none());
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn backup_copies_content_with_increasing_names() {
        let (_dir, manager) = setup();
        fs::write(manager.snapshot_path(), b"v1").unwrap();

        let first = manager.create_backup().unwrap().unwrap();
        let second = manager.create_backup().unwrap().unwrap();

        assert!(second.timestamp_ms > first.timestamp_ms);
        assert_eq!(fs::read(&first.path).unwrap(), b"v1");
        assert!(first
            .path
            .to_string_lossy()
            .contains("orgData.json.backup."));
        assert_eq!(manager.list().unwrap(), vec![first, second]);
    }

    #[test]
    fn write_guard_is_exclusive() {
        let (_dir, manager) = setup();
        let guard = manager.begin_write().unwrap();
        assert!(matches!(
            manager.begin_write(),
            Err(CoreError::SnapshotLocked(_))
        ));
        drop(guard);
        assert!(manager.begin_write().is_ok());
    }

    #[test]
    fn restore_backs_up_current_first() {
        let (_dir, manager) = setup();
        fs::write(manager.snapshot_path(), b"old").unwrap();
        let old = manager.create_backup().unwrap().unwrap();
        fs::write(manager.snapshot_path(), b"new").unwrap();

        let guard = manager.restore(&old.path).unwrap();
        let pre_restore = guard.backup().unwrap();
        assert_eq!(fs::read(&pre_restore.path).unwrap(), b"new");
        assert_eq!(fs::read(manager.snapshot_path()).unwrap(), b"old");
    }

    #[test]
    fn restore_missing_backup_fails() {
        let (dir, manager) = setup();
        let missing = dir.path().join("nope");
        assert!(matches!(
            manager.restore(&missing),
            Err(CoreError::BackupNotFound(_))
        ));
    }

    #[test]
    fn ignores_unrelated_files() {
        let (dir, manager) = setup();
        fs::write(dir.path().join("orgData.json.backup.notanumber"), b"").unwrap();
        fs::write(dir.path().join("other.json.backup.123"), b"").unwrap();
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn retention_keep_last() {
        let (_dir, manager) = setup();
        fs::write(manager.snapshot_path(), b"x").unwrap();
        for _ in 0..4 {
            manager.create_backup().unwrap();
        }
        let removed = manager.prune(&RetentionPolicy::KeepLast(1)).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(manager.list().unwrap().len(), 1);
    }

    #[test]
    fn retention_max_age_and_keep_all() {
        let record = |ts| BackupRecord {
            path: PathBuf::from(format!("b{ts}")),
            timestamp_ms: ts,
            size: 0,
        };
        let backups = vec![record(1_000), record(5_000), record(9_000)];

        let expired = RetentionPolicy::MaxAge(Duration::from_secs(5)).select_expired(&backups, 10_000);
        assert_eq!(expired, vec![&backups[0]]);
        assert!(RetentionPolicy::KeepAll.select_expired(&backups, 10_000).is_empty());
    }

    #[test]
    fn huge_max_age_expires_nothing() {
        let backups = vec![BackupRecord {
            path: PathBuf::from("b1"),
            timestamp_ms: 1,
            size: 0,
        }];

        let policy = RetentionPolicy::max_age_days(u64::MAX);
        assert_eq!(policy, RetentionPolicy::MaxAge(Duration::from_secs(u64::MAX)));
        assert!(policy.select_expired(&backups, now_ms()).is_empty());
        assert!(RetentionPolicy::MaxAge(Duration::MAX)
            .select_expired(&backups, u64::MAX)
            .is_empty());
        assert_eq!(
            RetentionPolicy::max_age_days(2),
            RetentionPolicy::MaxAge(Duration::from_secs(2 * SECS_PER_DAY))
        );
    }

    #[test]
    fn atomic_write_replaces_content() {
        let (dir, _) = setup();
        let path = dir.path().join("nested/file.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert!(!with_suffix(&path, TEMP_SUFFIX).exists());
    }
}
