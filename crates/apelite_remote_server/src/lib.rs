//! # AP Elite Remote Server
//!
//! Reference remote document store for the AP Elite hybrid sync engine.
//!
//! This crate provides:
//! - An in-memory, collection-keyed document store
//! - The HTTP document contract the sync engine's `HttpRemoteStore` speaks
//!
//! # Contract
//!
//! ```text
//! GET  /health
//! GET  /collections/{collection}/documents
//! GET  /collections/{collection}/documents/{id}    (404 = not found)
//! PUT  /collections/{collection}/documents/{id}
//! ```
//!
//! Stored documents carry an internal `_id`, the way a document database
//! attaches one. Clients are expected to ignore it.
//!
//! ```rust,ignore
//! use apelite_remote_server::{RemoteServer, ServerConfig};
//!
//! let server = RemoteServer::new(ServerConfig::default());
//! server.serve().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod config;
mod error;
mod server;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{RemoteServer, RunningServer};
pub use store::{DocumentStore, INTERNAL_ID};
