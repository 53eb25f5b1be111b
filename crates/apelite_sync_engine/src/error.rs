//! Error types for the sync engine.

use apelite_core::CoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store could not be reached or rejected the request.
    #[error("remote unavailable: {message}")]
    RemoteUnavailable {
        /// Error message.
        message: String,
    },

    /// A remote request exceeded its deadline.
    #[error("remote operation timed out")]
    Timeout,

    /// A document or row is not usable.
    #[error("malformed document: {message}")]
    Malformed {
        /// Description of what is wrong.
        message: String,
    },

    /// Both sides changed a row and the policy leaves it to an operator.
    #[error("update/update conflict on {table} row {record_id}")]
    ConflictUpdateUpdate {
        /// Table name.
        table: String,
        /// Row id.
        record_id: String,
    },

    /// Local store error.
    #[error("storage error: {0}")]
    Storage(#[from] CoreError),

    /// No conflict with the given id.
    #[error("conflict not found: {id}")]
    ConflictNotFound {
        /// The conflict id that was looked up.
        id: String,
    },

    /// The requested resolution does not apply to the conflict.
    #[error("invalid resolution: {message}")]
    InvalidResolution {
        /// Why the resolution was refused.
        message: String,
    },

    /// The task running a sync cycle panicked or was cancelled.
    #[error("sync task aborted: {message}")]
    Aborted {
        /// Join failure.
        message: String,
    },
}

impl SyncError {
    /// Creates a remote unavailable error.
    pub fn remote_unavailable(message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            message: message.into(),
        }
    }

    /// Creates a malformed document error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an aborted cycle error.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted {
            message: message.into(),
        }
    }

    /// Creates an invalid resolution error.
    pub fn invalid_resolution(message: impl Into<String>) -> Self {
        Self::InvalidResolution {
            message: message.into(),
        }
    }

    /// Returns true if the remote store could not serve the request. The
    /// engine treats this as "offline for this table".
    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, SyncError::RemoteUnavailable { .. } | SyncError::Timeout)
    }

    /// Returns true if the local store cannot be written, which ends the
    /// cycle.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Storage(e) => e.is_storage_failure(),
            _ => false,
        }
    }
}
