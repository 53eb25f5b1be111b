//! CLI command implementations.

pub mod backup;
pub mod config;
pub mod serve;
pub mod status;
pub mod sync;

use apelite_core::{BackupManager, ConfigStore, DataRoot, LocalStore, SyncLog};
use apelite_sync_engine::{HttpRemoteStore, RemoteConfig, SyncEngine};
use std::path::PathBuf;
use std::sync::Arc;

/// Result type for command implementations.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Where the commands find their state. Nothing is opened until a command
/// asks for it.
pub struct Workspace {
    root: DataRoot,
    remote_url: String,
}

impl Workspace {
    /// Uses `data_root`, or the platform default when absent.
    pub fn new(data_root: Option<PathBuf>, remote_url: String) -> Self {
        let root = DataRoot::new(data_root.unwrap_or_else(DataRoot::default_location));
        Self { root, remote_url }
    }

    /// Layout of the data root.
    pub fn root(&self) -> &DataRoot {
        &self.root
    }

    /// Opens the sync log, creating the data root layout if needed.
    pub fn log(&self) -> CliResult<Arc<SyncLog>> {
        self.root.ensure_layout()?;
        Ok(Arc::new(SyncLog::new(self.root.log_path())))
    }

    /// Loads the persisted settings.
    pub fn config_store(&self) -> CliResult<Arc<ConfigStore>> {
        let log = self.log()?;
        Ok(Arc::new(ConfigStore::load(self.root.config_path(), log)?))
    }

    /// Opens every component and wires the engine.
    ///
    /// Takes the local store's lock, so it fails while another process
    /// (typically `apelite serve`) owns the data root.
    pub fn engine(&self) -> CliResult<Arc<SyncEngine>> {
        let log = self.log()?;
        let config = Arc::new(ConfigStore::load(self.root.config_path(), log.clone())?);
        let store = Arc::new(LocalStore::open(&self.root.database_path())?);
        let backups = Arc::new(BackupManager::new(
            store.clone(),
            self.root.backup_dir(),
            config.clone(),
            log.clone(),
        ));
        let remote = Arc::new(HttpRemoteStore::new(RemoteConfig::new(&self.remote_url))?);

        Ok(Arc::new(
            SyncEngine::new(store, remote, config, log, backups).with_data_root(self.root.path()),
        ))
    }
}

/// Pretty-prints `value` as JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
