//! Per-table sync state and engine statistics.

use apelite_core::Table;
use serde::{Deserialize, Serialize};

/// Progress of one table within a cycle.
///
/// `Idle -> Pulling -> Pushing -> Done`, or `Failed` from either active state.
/// `Failed` is terminal for the cycle and does not block other tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSyncState {
    /// Not started.
    Idle,
    /// Copying remote rows into the local store.
    Pulling,
    /// Copying local rows to the remote store.
    Pushing,
    /// Both directions succeeded.
    Done,
    /// A direction failed.
    Failed,
}

impl TableSyncState {
    /// Returns true once the table is finished for this cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TableSyncState::Done | TableSyncState::Failed)
    }

    /// Returns true if `next` is a legal successor.
    pub fn can_transition_to(&self, next: TableSyncState) -> bool {
        use TableSyncState::*;
        matches!(
            (self, next),
            (Idle, Pulling) | (Pulling, Pushing) | (Pulling, Failed) | (Pushing, Done) | (Pushing, Failed)
        )
    }
}

/// The table a running cycle is working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableProgress {
    /// Table being synced.
    pub table: Table,
    /// Its state.
    pub state: TableSyncState,
}

/// Counters accumulated since the engine was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Cycles that ran to completion.
    pub cycles_completed: u64,
    /// Rows written into the local store.
    pub rows_pulled: u64,
    /// Rows written to the remote store.
    pub rows_pushed: u64,
    /// Conflicts filed in `sync_conflicts`.
    pub conflicts_filed: u64,
    /// Remote documents skipped for lacking an `id`.
    pub malformed_skipped: u64,
    /// Last cycle-level error.
    pub last_error: Option<String>,
}
