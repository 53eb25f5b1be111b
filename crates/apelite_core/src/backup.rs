//! Local store snapshots and their retention.
//!
//! A backup is a byte-for-byte copy of the database file taken while the
//! store is quiesced, named `ap_elite_backup_<YYYYMMDD_HHMMSS>.db` after the
//! local time. After every snapshot the retention pass keeps the newest
//! `max_backup_files` snapshots by modification time.

use crate::config::ConfigStore;
use crate::error::{CoreError, CoreResult};
use crate::log::SyncLog;
use crate::store::LocalStore;
use crate::time::format_utc;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

const BACKUP_PREFIX: &str = "ap_elite_backup_";
const BACKUP_SUFFIX: &str = ".db";
const PARTIAL_SUFFIX: &str = ".partial";

/// A snapshot that was just written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    /// Path of the snapshot.
    pub path: PathBuf,
    /// Local timestamp used in the file name, `YYYYMMDD_HHMMSS`.
    pub timestamp: String,
    /// Size in bytes.
    pub size: u64,
}

/// Result of a backup request as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupReport {
    /// The snapshot was written and retention ran.
    Success {
        /// Path of the snapshot.
        backup_file: String,
        /// Local timestamp, `YYYYMMDD_HHMMSS`.
        timestamp: String,
        /// Size in bytes.
        size: u64,
    },
    /// The snapshot or retention failed.
    Error {
        /// Failure description.
        message: String,
    },
}

impl BackupReport {
    /// Returns true for [`BackupReport::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, BackupReport::Success { .. })
    }
}

impl From<BackupInfo> for BackupReport {
    fn from(info: BackupInfo) -> Self {
        BackupReport::Success {
            backup_file: info.path.display().to_string(),
            timestamp: info.timestamp,
            size: info.size,
        }
    }
}

/// An existing snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// File name.
    pub file_name: String,
    /// Full path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, RFC 3339 UTC.
    pub modified: String,
}

/// Takes and prunes snapshots of the local store.
#[derive(Debug)]
pub struct BackupManager {
    store: Arc<LocalStore>,
    backup_dir: PathBuf,
    config: Arc<ConfigStore>,
    log: Arc<SyncLog>,
}

impl BackupManager {
    /// Creates a manager writing into `backup_dir`.
    pub fn new(
        store: Arc<LocalStore>,
        backup_dir: impl Into<PathBuf>,
        config: Arc<ConfigStore>,
        log: Arc<SyncLog>,
    ) -> Self {
        Self {
            store,
            backup_dir: backup_dir.into(),
            config,
            log,
        }
    }

    /// Directory holding the snapshots.
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Takes a snapshot and runs retention. Failures are logged and reported,
    /// never returned.
    pub fn create(&self) -> BackupReport {
        match self.try_create() {
            Ok(info) => info.into(),
            Err(e) => {
                self.log.error(format!("backup failed: {e}"));
                BackupReport::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Takes a snapshot and runs retention.
    pub fn try_create(&self) -> CoreResult<BackupInfo> {
        fs::create_dir_all(&self.backup_dir).map_err(|e| {
            CoreError::backup_failed(format!(
                "cannot create {}: {e}",
                self.backup_dir.display()
            ))
        })?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let path = self.unused_path(&timestamp);
        let mut partial = path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        let size = self
            .store
            .with_quiesced(|source| fs::copy(source, &partial))
            .map_err(|e| {
                let _ = fs::remove_file(&partial);
                CoreError::backup_failed(format!("snapshot of {} failed: {e}", self.store.path().display()))
            })?;
        fs::rename(&partial, &path)
            .map_err(|e| CoreError::backup_failed(format!("cannot finalize snapshot: {e}")))?;

        let max_files = self.config.get().max_backup_files as usize;
        let removed = self.apply_retention(max_files)?;

        self.log.info(format!(
            "backup created: {} ({size} bytes, {removed} old snapshot(s) removed)",
            path.display()
        ));
        Ok(BackupInfo {
            path,
            timestamp,
            size,
        })
    }

    /// Existing snapshots, newest first.
    pub fn list(&self) -> CoreResult<Vec<BackupEntry>> {
        Ok(self
            .snapshots()?
            .into_iter()
            .map(|(path, modified, size)| BackupEntry {
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: path.display().to_string(),
                size,
                modified: format_utc(DateTime::<Utc>::from(modified)),
            })
            .collect())
    }

    /// Number of snapshots on disk.
    pub fn count(&self) -> CoreResult<usize> {
        Ok(self.snapshots()?.len())
    }

    /// Deletes every snapshot beyond the newest `keep`. Returns how many were
    /// removed.
    pub fn apply_retention(&self, keep: usize) -> CoreResult<usize> {
        let snapshots = self
            .snapshots()
            .map_err(|e| CoreError::backup_failed(format!("retention listing failed: {e}")))?;

        let mut removed = 0;
        for (path, _, _) in snapshots.into_iter().skip(keep) {
            fs::remove_file(&path).map_err(|e| {
                CoreError::backup_failed(format!("cannot remove {}: {e}", path.display()))
            })?;
            removed += 1;
        }
        Ok(removed)
    }

    fn unused_path(&self, timestamp: &str) -> PathBuf {
        let base = self
            .backup_dir
            .join(format!("{BACKUP_PREFIX}{timestamp}{BACKUP_SUFFIX}"));
        if !base.exists() {
            return base;
        }
        (1u32..)
            .map(|n| {
                self.backup_dir
                    .join(format!("{BACKUP_PREFIX}{timestamp}_{n}{BACKUP_SUFFIX}"))
            })
            .find(|p| !p.exists())
            .unwrap_or(base)
    }

    /// Snapshot files sorted by modification time, newest first. Ties are
    /// broken by file name, which embeds the timestamp.
    fn snapshots(&self) -> CoreResult<Vec<(PathBuf, SystemTime, u64)>> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !is_snapshot_name(&name) {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            snapshots.push((entry.path(), meta.modified()?, meta.len()));
        }
        snapshots.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        Ok(snapshots)
    }
}

fn is_snapshot_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::table::{Row, Table};
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn manager(max_backup_files: u32) -> (TempDir, Arc<LocalStore>, BackupManager) {
        let temp = tempdir().unwrap();
        let log = Arc::new(SyncLog::new(temp.path().join("sync.log")));
        let config = Arc::new(
            ConfigStore::load(temp.path().join("sync_config.json"), log.clone()).unwrap(),
        );
        config
            .replace(SyncSettings {
                max_backup_files,
                ..SyncSettings::default()
            })
            .unwrap();
        let store = Arc::new(LocalStore::open(&temp.path().join("ap_elite_local.db")).unwrap());
        let backups = BackupManager::new(store.clone(), temp.path().join("backup"), config, log);
        (temp, store, backups)
    }

    #[test]
    fn snapshot_is_a_byte_copy() {
        let (_temp, store, backups) = manager(7);
        store
            .upsert(
                Table::Users,
                &Row::from_remote(json!({"id": "u1", "name": "A"})).unwrap(),
            )
            .unwrap();

        let info = backups.try_create().unwrap();
        let name = info.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(is_snapshot_name(&name));
        assert_eq!(info.timestamp.len(), "YYYYMMDD_HHMMSS".len());
        assert_eq!(fs::read(&info.path).unwrap(), fs::read(store.path()).unwrap());
        assert_eq!(info.size, fs::metadata(store.path()).unwrap().len());
    }

    #[test]
    fn report_shape() {
        let (_temp, _store, backups) = manager(7);
        let report = serde_json::to_value(backups.create()).unwrap();
        assert_eq!(report["status"], json!("success"));
        assert!(report["backup_file"].as_str().unwrap().ends_with(".db"));
        assert!(report["size"].as_u64().unwrap() > 0);
    }

    #[test]
    fn same_second_snapshots_do_not_collide() {
        let (_temp, _store, backups) = manager(10);
        let first = backups.try_create().unwrap();
        let second = backups.try_create().unwrap();
        assert_ne!(first.path, second.path);
        assert_eq!(backups.count().unwrap(), 2);
    }

    #[test]
    fn retention_keeps_newest() {
        let (_temp, _store, backups) = manager(3);
        let mut last = None;
        for _ in 0..5 {
            last = Some(backups.try_create().unwrap());
        }
        assert_eq!(backups.count().unwrap(), 3);

        let newest = backups.list().unwrap();
        assert_eq!(newest[0].path, last.unwrap().path.display().to_string());
    }

    #[test]
    fn retention_ignores_foreign_files() {
        let (_temp, _store, backups) = manager(1);
        fs::create_dir_all(backups.backup_dir()).unwrap();
        fs::write(backups.backup_dir().join("notes.txt"), b"keep me").unwrap();
        backups.try_create().unwrap();
        backups.try_create().unwrap();

        assert_eq!(backups.count().unwrap(), 1);
        assert!(backups.backup_dir().join("notes.txt").exists());
    }

    #[test]
    fn retention_over_spaced_snapshots() {
        let (_temp, _store, backups) = manager(3);
        let mut created = Vec::new();
        for i in 0..5 {
            if i > 0 {
                std::thread::sleep(Duration::from_secs(1));
            }
            created.push(backups.try_create().unwrap().path);
        }

        let remaining: HashSet<_> = backups
            .list()
            .unwrap()
            .into_iter()
            .map(|entry| PathBuf::from(entry.path))
            .collect();
        let expected: HashSet<_> = created[2..].iter().cloned().collect();
        assert_eq!(remaining, expected);
    }

    #[test]
    fn failure_is_reported_not_raised() {
        let (temp, _store, _) = manager(3);
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let log = Arc::new(SyncLog::new(temp.path().join("sync.log")));
        let config = Arc::new(ConfigStore::load(temp.path().join("other.json"), log.clone()).unwrap());
        let store = Arc::new(LocalStore::open(&temp.path().join("second.db")).unwrap());
        let backups = BackupManager::new(store, blocker.join("backup"), config, log);

        let report = backups.create();
        assert!(matches!(report, BackupReport::Error { .. }));
        let log = fs::read_to_string(temp.path().join("sync.log")).unwrap();
        assert!(log.contains("ERROR: backup failed"));
    }
}
