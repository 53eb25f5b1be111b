//! # AP Elite Testkit
//!
//! Test utilities for the AP Elite hybrid sync engine.
//!
//! This crate provides:
//! - `TestDataRoot`, a fully opened data root in a temporary directory
//! - Row helpers (`doc`, `RowBuilder`)
//! - Property-based generators for replicated rows
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apelite_testkit::prelude::*;
//!
//! #[test]
//! fn stores_a_row() {
//!     let root = TestDataRoot::new();
//!     root.store.upsert(Table::Users, &RowBuilder::new("u1").build()).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use apelite_core::{Row, Table};
}

pub use fixtures::*;
pub use generators::*;
