//! Conflict policy decisions.

use apelite_core::{compare_updated_at, ConflictPolicy, Row};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// What to do with a row present on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The remote row replaces the local one.
    TakeRemote,
    /// The local row replaces the remote one.
    TakeLocal,
    /// File an `update_update` conflict and leave both sides alone.
    Conflict,
}

/// Decides between a local and a remote version of the same row.
///
/// Rows with equal `updated_at` are not in conflict and resolve to the remote
/// version under every policy.
pub fn resolve(policy: ConflictPolicy, local: &Row, remote: &Row) -> Resolution {
    let order = compare_updated_at(local.updated_at(), remote.updated_at());
    if order == Ordering::Equal {
        return Resolution::TakeRemote;
    }
    match policy {
        ConflictPolicy::NewestWins => {
            if order == Ordering::Greater {
                Resolution::TakeLocal
            } else {
                Resolution::TakeRemote
            }
        }
        ConflictPolicy::LocalWins => Resolution::TakeLocal,
        ConflictPolicy::RemoteWins => Resolution::TakeRemote,
        ConflictPolicy::Manual => Resolution::Conflict,
    }
}

/// An operator's decision on a filed conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    /// Push the local payload to the remote store.
    Local,
    /// Apply the remote payload to the local store.
    Remote,
    /// Close the conflict without touching either store.
    Dismiss,
}
