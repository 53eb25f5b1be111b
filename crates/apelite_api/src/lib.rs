//! # AP Elite Operator API
//!
//! HTTP surface through which operators drive and inspect the sync engine.
//!
//! Every route lives under `/api/hybrid`:
//!
//! ```text
//! GET  status                   system status report
//! POST sync                     run one sync cycle
//! POST backup                   take a snapshot of the local store
//! GET  backups                  existing snapshots, newest first
//! GET  config                   current settings
//! PUT  config                   merge a JSON object into the settings
//! GET  conflicts?all=bool       filed conflicts (unresolved by default)
//! POST conflicts/{id}/resolve   {"keep": "local" | "remote" | "dismiss"}
//! ```
//!
//! Failures answer with `{"status": "error", "message": ...}`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod config;
mod error;
mod handlers;
mod server;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use handlers::{ConflictQuery, ResolveRequest};
pub use server::{ApiServer, AppState, API_PREFIX};
