//! Data root layout.
//!
//! ```text
//! <data_root>/
//! ├─ dados/ap_elite_local.db     # Local store
//! ├─ backup/                     # ap_elite_backup_<ts>.db snapshots
//! ├─ config/sync_config.json     # Sync settings
//! └─ logs/sync.log               # Sync log
//! ```

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DATABASE_DIR: &str = "dados";
const DATABASE_FILE: &str = "ap_elite_local.db";
const BACKUP_DIR: &str = "backup";
const CONFIG_DIR: &str = "config";
const CONFIG_FILE: &str = "sync_config.json";
const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "sync.log";

/// Directory name under the home directory on non-Windows hosts.
const DEFAULT_DIR_NAME: &str = "AP_Elite";

/// Disk usage of the volume holding the data root.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    /// Volume size in bytes.
    pub total: u64,
    /// Bytes in use.
    pub used: u64,
    /// Bytes available to this process.
    pub free: u64,
    /// `used / total` as a percentage, one decimal.
    pub percent: f64,
}

/// Paths of every file the engine owns under a data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    /// Uses `root` as the data root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `C:\AP_Elite` on Windows, `$HOME/AP_Elite` elsewhere.
    #[must_use]
    pub fn default_location() -> PathBuf {
        if cfg!(windows) {
            PathBuf::from(r"C:\AP_Elite")
        } else {
            directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().join(DEFAULT_DIR_NAME))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR_NAME))
        }
    }

    /// Creates every subdirectory. Idempotent.
    pub fn ensure_layout(&self) -> CoreResult<()> {
        for dir in [DATABASE_DIR, BACKUP_DIR, CONFIG_DIR, LOG_DIR] {
            fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }

    /// The data root itself.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Local store database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_DIR).join(DATABASE_FILE)
    }

    /// Directory holding backup snapshots.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    /// Sync settings file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Sync log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_DIR).join(LOG_FILE)
    }

    /// Disk usage of the volume holding the data root.
    pub fn disk_usage(&self) -> CoreResult<DiskUsage> {
        let total = fs2::total_space(&self.root)?;
        let free = fs2::available_space(&self.root)?;
        let used = total.saturating_sub(free);
        let percent = if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Ok(DiskUsage {
            total,
            used,
            free,
            percent,
        })
    }
}
