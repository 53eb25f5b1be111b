//! Reports returned to operators.

use crate::state::{SyncStats, TableProgress, TableSyncState};
use apelite_core::{DiskUsage, SyncSettings, SyncStatusRow, Table};
use serde::{Deserialize, Serialize};

/// Outcome of one table within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableOutcome {
    /// Both directions succeeded.
    Success,
    /// At least one direction failed.
    Partial,
}

/// Per-table entry of a [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSyncResult {
    /// Table name.
    pub table: Table,
    /// Whether the pull succeeded.
    pub remote_to_local: bool,
    /// Whether the push succeeded.
    pub local_to_remote: bool,
    /// Summary.
    pub status: TableOutcome,
    /// Final state of the table.
    pub state: TableSyncState,
}

impl TableSyncResult {
    /// Builds the entry from both direction results.
    pub fn new(table: Table, remote_to_local: bool, local_to_remote: bool) -> Self {
        let ok = remote_to_local && local_to_remote;
        Self {
            table,
            remote_to_local,
            local_to_remote,
            status: if ok {
                TableOutcome::Success
            } else {
                TableOutcome::Partial
            },
            state: if ok {
                TableSyncState::Done
            } else {
                TableSyncState::Failed
            },
        }
    }
}

/// Result of [`SyncEngine::full_sync`](crate::SyncEngine::full_sync).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncReport {
    /// Another cycle was in progress; nothing was touched.
    AlreadyRunning,
    /// The remote store was unreachable; nothing was touched.
    Offline,
    /// The cycle ran over every table. Individual tables may be partial.
    Success {
        /// When the cycle finished.
        last_sync: String,
        /// One entry per table, in processing order.
        results: Vec<TableSyncResult>,
    },
}

impl SyncReport {
    /// Returns true for [`SyncReport::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, SyncReport::Success { .. })
    }
}

/// Database file details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Path of the database file.
    pub path: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

/// Row count of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCount {
    /// Table name.
    pub table: Table,
    /// Number of rows.
    pub rows: u64,
}

/// Result of [`SyncEngine::system_status`](crate::SyncEngine::system_status).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Whether the remote answered the ping.
    pub online: bool,
    /// When the last cycle finished.
    pub last_sync: Option<String>,
    /// Whether a cycle is running.
    pub sync_in_progress: bool,
    /// Table the running cycle is working on.
    pub current: Option<TableProgress>,
    /// Database file.
    pub database: DatabaseInfo,
    /// Disk usage of the data directory, when it could be read.
    pub disk: Option<DiskUsage>,
    /// Row counts in processing order.
    pub tables: Vec<TableCount>,
    /// Every `sync_status` row.
    pub sync_status: Vec<SyncStatusRow>,
    /// Number of backup snapshots.
    pub backup_count: usize,
    /// Current settings.
    pub config: SyncSettings,
    /// Engine counters.
    pub stats: SyncStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sync_report_wire_format() {
        assert_eq!(
            serde_json::to_value(SyncReport::AlreadyRunning).unwrap(),
            json!({"status": "already_running"})
        );
        assert_eq!(
            serde_json::to_value(SyncReport::Offline).unwrap(),
            json!({"status": "offline"})
        );

        let report = SyncReport::Success {
            last_sync: "2024-01-01T00:00:00.000Z".into(),
            results: vec![TableSyncResult::new(Table::Users, true, false)],
        };
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            json!({
                "status": "success",
                "last_sync": "2024-01-01T00:00:00.000Z",
                "results": [{
                    "table": "users",
                    "remote_to_local": true,
                    "local_to_remote": false,
                    "status": "partial",
                    "state": "failed"
                }]
            })
        );
    }

    #[test]
    fn table_result_summary() {
        let ok = TableSyncResult::new(Table::Cases, true, true);
        assert_eq!(ok.status, TableOutcome::Success);
        assert_eq!(ok.state, TableSyncState::Done);
    }
}
