//! Error types for the AP Elite core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the local store, configuration and backup layers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The local database cannot be opened or written.
    #[error("storage unavailable: {message}")]
    StorageUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Table is not one of the replicated tables.
    #[error("unknown table: {name}")]
    UnknownTable {
        /// The rejected table name.
        name: String,
    },

    /// A row lacks a usable `id` or is not a JSON object.
    #[error("malformed row: {message}")]
    Malformed {
        /// Description of what is wrong with the row.
        message: String,
    },

    /// Another handle or process owns the database file.
    #[error("local store locked: another process has exclusive access")]
    StoreLocked,

    /// Configuration is unreadable or fails validation.
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of the problem.
        message: String,
    },

    /// Snapshot or retention pass failed.
    #[error("backup failed: {message}")]
    BackupFailed {
        /// Description of the failure.
        message: String,
    },

    /// No conflict with the given id.
    #[error("conflict not found: {id}")]
    ConflictNotFound {
        /// The conflict id that was looked up.
        id: String,
    },
}

impl CoreError {
    /// Creates a storage unavailable error.
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Creates an unknown table error.
    pub fn unknown_table(name: impl Into<String>) -> Self {
        Self::UnknownTable { name: name.into() }
    }

    /// Creates a malformed row error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    /// Creates a backup failed error.
    pub fn backup_failed(message: impl Into<String>) -> Self {
        Self::BackupFailed {
            message: message.into(),
        }
    }

    /// Returns true if the error means the local store cannot be opened or
    /// written at all, as opposed to a problem with a single row.
    pub fn is_storage_failure(&self) -> bool {
        use rusqlite::ErrorCode;

        match self {
            CoreError::StorageUnavailable { .. } | CoreError::StoreLocked | CoreError::Io(_) => {
                true
            }
            CoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::ReadOnly
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DiskFull
                    | ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::PermissionDenied
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::OutOfMemory
            ),
            _ => false,
        }
    }
}
