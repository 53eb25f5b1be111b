//! # AP Elite Core
//!
//! Local side of the AP Elite hybrid online/offline sync engine.
//!
//! This crate provides:
//! - The replicated table registry and the JSON row type
//! - `LocalStore`, the embedded SQLite database the back office works against
//!   while offline, with its `sync_status` and `sync_conflicts` bookkeeping
//! - The data root layout (`dados/`, `backup/`, `config/`, `logs/`)
//! - `ConfigStore`, the persisted sync settings
//! - `SyncLog`, the operator-facing sync log
//! - `BackupManager`, file snapshots of the local store with retention
//!
//! ## Key Invariants
//!
//! - Exactly one `LocalStore` handle owns the database file
//! - Every row upsert commits in its own transaction
//! - The engine never deletes replicated rows

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod backup;
pub mod config;
pub mod dir;
mod error;
pub mod log;
mod schema;
pub mod store;
pub mod table;
pub mod time;

pub use backup::{BackupEntry, BackupInfo, BackupManager, BackupReport};
pub use config::{ConfigStore, ConflictPolicy, SyncSettings};
pub use dir::{DataRoot, DiskUsage};
pub use error::{CoreError, CoreResult};
pub use log::{LogLevel, SyncLog};
pub use store::{
    ConflictKind, ConflictRecord, LocalStore, NewConflict, SyncStatusRow, TableStatus,
};
pub use table::{Row, Table};
pub use time::{compare_updated_at, now_utc};
