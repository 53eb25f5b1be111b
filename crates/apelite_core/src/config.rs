//! Operator-tunable sync settings and their JSON file.

use crate::error::{CoreError, CoreResult};
use crate::log::SyncLog;
use chrono::NaiveTime;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// How rows changed on both sides are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The larger `updated_at` wins; ties go to the remote.
    #[default]
    NewestWins,
    /// The local row always wins.
    LocalWins,
    /// The remote row always wins.
    RemoteWins,
    /// Both payloads are filed in `sync_conflicts` and neither side changes.
    Manual,
}

impl ConflictPolicy {
    /// Configuration value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::NewestWins => "newest_wins",
            ConflictPolicy::LocalWins => "local_wins",
            ConflictPolicy::RemoteWins => "remote_wins",
            ConflictPolicy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest_wins" => Ok(ConflictPolicy::NewestWins),
            "local_wins" => Ok(ConflictPolicy::LocalWins),
            "remote_wins" => Ok(ConflictPolicy::RemoteWins),
            "manual" => Ok(ConflictPolicy::Manual),
            other => Err(CoreError::config_invalid(format!(
                "unknown conflict_resolution: {other}"
            ))),
        }
    }
}

/// The persisted configuration record.
///
/// Missing keys take their default; keys this version does not know are kept
/// in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Minutes between scheduled sync cycles.
    pub sync_interval_minutes: u32,
    /// Local time of the daily backup, `HH:MM`.
    pub backup_time: String,
    /// Whether the scheduler takes daily backups.
    pub auto_backup: bool,
    /// Whether the scheduler runs sync cycles.
    pub auto_sync: bool,
    /// Conflict policy.
    pub conflict_resolution: ConflictPolicy,
    /// Number of backup files kept by retention.
    pub max_backup_files: u32,
    /// Unknown keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval_minutes: 30,
            backup_time: "02:00".to_string(),
            auto_backup: true,
            auto_sync: true,
            conflict_resolution: ConflictPolicy::NewestWins,
            max_backup_files: 7,
            extra: Map::new(),
        }
    }
}

impl SyncSettings {
    /// Checks value ranges.
    pub fn validate(&self) -> CoreResult<()> {
        if self.sync_interval_minutes < 1 {
            return Err(CoreError::config_invalid(
                "sync_interval_minutes must be at least 1",
            ));
        }
        if self.max_backup_files < 1 {
            return Err(CoreError::config_invalid(
                "max_backup_files must be at least 1",
            ));
        }
        self.backup_time_of_day()?;
        Ok(())
    }

    /// `backup_time` parsed as a time of day.
    pub fn backup_time_of_day(&self) -> CoreResult<NaiveTime> {
        let invalid = || {
            CoreError::config_invalid(format!(
                "backup_time must be HH:MM, got {:?}",
                self.backup_time
            ))
        };
        if self.backup_time.len() != 5 {
            return Err(invalid());
        }
        NaiveTime::parse_from_str(&self.backup_time, "%H:%M").map_err(|_| invalid())
    }

    /// Returns a copy with the keys of `patch` overlaid.
    pub fn patched(&self, patch: &Map<String, Value>) -> CoreResult<Self> {
        let mut merged = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(merged))
            .map_err(|e| CoreError::config_invalid(e.to_string()))
    }
}

/// Loads, holds and persists [`SyncSettings`].
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    settings: RwLock<SyncSettings>,
    log: Arc<SyncLog>,
}

impl ConfigStore {
    /// Loads settings from `path`.
    ///
    /// A missing file is created with the defaults. An unreadable or invalid
    /// file is left untouched and the defaults are used, with a WARN line.
    pub fn load(path: impl Into<PathBuf>, log: Arc<SyncLog>) -> CoreResult<Self> {
        let path = path.into();
        let settings = match read_settings(&path) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                let defaults = SyncSettings::default();
                write_atomic(&path, &defaults)?;
                log.info(format!("created default configuration at {}", path.display()));
                defaults
            }
            Err(e) => {
                log.warn(format!(
                    "configuration {} unusable, using defaults: {e}",
                    path.display()
                ));
                SyncSettings::default()
            }
        };

        Ok(Self {
            path,
            settings: RwLock::new(settings),
            log,
        })
    }

    /// Path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings.
    pub fn get(&self) -> SyncSettings {
        self.settings.read().clone()
    }

    /// Validates and persists `settings`, replacing the current ones.
    pub fn replace(&self, settings: SyncSettings) -> CoreResult<SyncSettings> {
        settings.validate()?;
        let mut current = self.settings.write();
        write_atomic(&self.path, &settings)?;
        *current = settings.clone();
        drop(current);

        self.log.info("configuration updated");
        Ok(settings)
    }

    /// Overlays `patch` on the current settings and persists the result.
    pub fn update(&self, patch: &Map<String, Value>) -> CoreResult<SyncSettings> {
        let next = self.get().patched(patch)?;
        self.replace(next)
    }

    /// Rewrites the file from the in-memory settings.
    pub fn save(&self) -> CoreResult<()> {
        let settings = self.settings.read();
        write_atomic(&self.path, &settings)
    }
}

fn read_settings(path: &Path) -> CoreResult<Option<SyncSettings>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CoreError::config_invalid(e.to_string())),
    };
    let settings: SyncSettings =
        serde_json::from_str(&text).map_err(|e| CoreError::config_invalid(e.to_string()))?;
    settings.validate()?;
    Ok(Some(settings))
}

/// Write-then-rename with fsync of the file and, on Unix, its directory.
fn write_atomic(path: &Path, settings: &SyncSettings) -> CoreResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut temp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let data = serde_json::to_vec_pretty(settings)?;
    let mut file = File::create(&temp_path)?;
    file.write_all(&data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    #[cfg(unix)]
    File::open(dir)?.sync_all()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn log_in(dir: &Path) -> Arc<SyncLog> {
        Arc::new(SyncLog::new(dir.join("sync.log")))
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config").join("sync_config.json");
        let store = ConfigStore::load(&path, log_in(temp.path())).unwrap();

        assert_eq!(store.get(), SyncSettings::default());
        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["conflict_resolution"], json!("newest_wins"));
        assert_eq!(on_disk["backup_time"], json!("02:00"));
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sync_config.json");
        fs::write(&path, r#"{"sync_interval_minutes": 5, "conflict_resolution": "manual"}"#)
            .unwrap();

        let settings = ConfigStore::load(&path, log_in(temp.path())).unwrap().get();
        assert_eq!(settings.sync_interval_minutes, 5);
        assert_eq!(settings.conflict_resolution, ConflictPolicy::Manual);
        assert_eq!(settings.max_backup_files, 7);
    }

    #[test]
    fn invalid_json_falls_back_without_overwriting() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sync_config.json");
        fs::write(&path, "{not json").unwrap();

        let store = ConfigStore::load(&path, log_in(temp.path())).unwrap();
        assert_eq!(store.get(), SyncSettings::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");

        let log = fs::read_to_string(temp.path().join("sync.log")).unwrap();
        assert!(log.contains("WARN: configuration"));
    }

    #[test]
    fn unknown_keys_survive_a_write() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sync_config.json");
        fs::write(&path, r#"{"max_backup_files": 3, "mongo_url": "mongodb://x"}"#).unwrap();

        let store = ConfigStore::load(&path, log_in(temp.path())).unwrap();
        let mut patch = Map::new();
        patch.insert("auto_backup".into(), json!(false));
        store.update(&patch).unwrap();

        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["mongo_url"], json!("mongodb://x"));
        assert_eq!(on_disk["max_backup_files"], json!(3));
        assert_eq!(on_disk["auto_backup"], json!(false));
        assert!(!temp.path().join("sync_config.json.tmp").exists());
    }

    #[test]
    fn replace_rejects_invalid_settings() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sync_config.json");
        let store = ConfigStore::load(&path, log_in(temp.path())).unwrap();

        for bad in [
            SyncSettings {
                sync_interval_minutes: 0,
                ..SyncSettings::default()
            },
            SyncSettings {
                max_backup_files: 0,
                ..SyncSettings::default()
            },
            SyncSettings {
                backup_time: "25:00".into(),
                ..SyncSettings::default()
            },
            SyncSettings {
                backup_time: "2:00".into(),
                ..SyncSettings::default()
            },
        ] {
            assert!(matches!(
                store.replace(bad),
                Err(CoreError::ConfigInvalid { .. })
            ));
        }
        assert_eq!(store.get(), SyncSettings::default());
    }

    #[test]
    fn patch_with_wrong_type_is_invalid() {
        let mut patch = Map::new();
        patch.insert("conflict_resolution".into(), json!("coin_flip"));
        assert!(matches!(
            SyncSettings::default().patched(&patch),
            Err(CoreError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn policy_parse() {
        assert_eq!(
            "remote_wins".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::RemoteWins
        );
        assert!("latest".parse::<ConflictPolicy>().is_err());
    }
}
