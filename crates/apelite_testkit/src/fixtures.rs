//! Test fixtures.
//!
//! `TestDataRoot` lays out a full data root in a temporary directory and opens
//! every core component on it, the way the server binary does at startup.

use apelite_core::{BackupManager, ConfigStore, DataRoot, LocalStore, Row, SyncLog, SyncSettings};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A data root with automatic cleanup.
pub struct TestDataRoot {
    /// Layout of the data root.
    pub root: DataRoot,
    /// Sync log.
    pub log: Arc<SyncLog>,
    /// Settings store.
    pub config: Arc<ConfigStore>,
    /// Local store.
    pub store: Arc<LocalStore>,
    /// Backup manager.
    pub backups: Arc<BackupManager>,
    _temp_dir: TempDir,
}

impl TestDataRoot {
    /// Creates a data root with default settings.
    pub fn new() -> Self {
        Self::with_settings(SyncSettings::default())
    }

    /// Creates a data root with the given settings.
    pub fn with_settings(settings: SyncSettings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = DataRoot::new(temp_dir.path());
        root.ensure_layout().expect("Failed to create data root layout");

        let log = Arc::new(SyncLog::new(root.log_path()));
        let config = Arc::new(
            ConfigStore::load(root.config_path(), log.clone()).expect("Failed to load config"),
        );
        config.replace(settings).expect("Invalid test settings");
        let store =
            Arc::new(LocalStore::open(&root.database_path()).expect("Failed to open local store"));
        let backups = Arc::new(BackupManager::new(
            store.clone(),
            root.backup_dir(),
            config.clone(),
            log.clone(),
        ));

        Self {
            root,
            log,
            config,
            store,
            backups,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the data root.
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Contents of the sync log.
    pub fn log_contents(&self) -> String {
        std::fs::read_to_string(self.root.log_path()).unwrap_or_default()
    }
}

impl Default for TestDataRoot {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a JSON document carrying a string `id` as a row.
///
/// # Panics
///
/// Panics if the document has no usable `id`.
pub fn doc(value: Value) -> Row {
    Row::from_remote(value).expect("document must have a string id")
}

/// Builds rows field by field.
#[derive(Debug, Clone)]
pub struct RowBuilder {
    fields: Map<String, Value>,
}

impl RowBuilder {
    /// Starts a row with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("id".into(), Value::String(id.into()));
        Self { fields }
    }

    /// Sets `created_at`.
    pub fn created_at(self, at: &str) -> Self {
        self.field("created_at", at)
    }

    /// Sets `updated_at`.
    pub fn updated_at(self, at: &str) -> Self {
        self.field("updated_at", at)
    }

    /// Sets a business field.
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Finishes the row.
    pub fn build(self) -> Row {
        Row::from_map(self.fields)
    }

    /// Finishes the row as a JSON document.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
