//! # AP Elite Sync Engine
//!
//! Bidirectional, best-effort replication between the local SQLite store and
//! the remote document store.
//!
//! This crate provides:
//! - The `RemoteStore` trait with HTTP and in-memory implementations
//! - Connectivity probing
//! - Conflict policy decisions
//! - `SyncEngine`: single-flight sync cycles, status reporting, conflict
//!   resolution and backups
//! - A scheduler for periodic syncs and daily backups
//!
//! ## Key Invariants
//!
//! - Tables are processed in a fixed order; within a table, pull precedes push
//! - At most one cycle runs at a time
//! - An offline cycle touches neither store
//! - The engine never deletes rows

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod config;
mod conflict;
mod connectivity;
mod engine;
mod error;
mod http;
mod remote;
mod report;
mod scheduler;
mod state;

pub use config::RemoteConfig;
pub use conflict::{resolve, ConflictChoice, Resolution};
pub use connectivity::ConnectivityMonitor;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use http::HttpRemoteStore;
pub use remote::{strip_internal_id, MemoryRemoteStore, RemoteStore, INTERNAL_ID};
pub use report::{
    DatabaseInfo, StatusReport, SyncReport, TableCount, TableOutcome, TableSyncResult,
};
pub use scheduler::{until_next, Scheduler};
pub use state::{SyncStats, TableProgress, TableSyncState};
