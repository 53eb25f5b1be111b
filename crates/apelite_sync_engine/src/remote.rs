//! Remote document store abstraction.

use crate::error::{SyncError, SyncResult};
use apelite_core::table::ID;
use apelite_core::{Row, Table};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Internal identifier a document database attaches to stored documents.
pub const INTERNAL_ID: &str = "_id";

/// The remote document store the engine replicates with.
///
/// Collections are named after the replicated tables. Documents are keyed by
/// their `id` field; internal storage identifiers are never returned.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns true iff a round-trip succeeds within a bounded time.
    async fn ping(&self) -> bool;

    /// Every document of `collection`. Documents are returned as received;
    /// some may lack a usable `id`.
    async fn fetch_all(&self, collection: Table) -> SyncResult<Vec<Value>>;

    /// A single document by `id`.
    async fn find(&self, collection: Table, id: &str) -> SyncResult<Option<Value>>;

    /// Creates or replaces the document keyed by the row's `id`.
    async fn upsert(&self, collection: Table, document: &Row) -> SyncResult<()>;
}

/// Removes the internal storage identifier from a document.
pub fn strip_internal_id(mut document: Value) -> Value {
    if let Value::Object(map) = &mut document {
        map.remove(INTERNAL_ID);
    }
    document
}

pub(crate) fn document_id(document: &Row) -> SyncResult<&str> {
    document
        .id()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SyncError::malformed("document has no string id"))
}

/// An in-memory remote store for tests and offline development.
///
/// Can be switched offline, or made to fail for individual collections.
#[derive(Debug)]
pub struct MemoryRemoteStore {
    collections: RwLock<HashMap<Table, Vec<Value>>>,
    online: AtomicBool,
    failing: RwLock<HashSet<Table>>,
    calls: AtomicUsize,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    /// Creates an empty, online store.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
            failing: RwLock::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Switches the store online or offline.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Makes every data operation on `collection` fail (or succeed again).
    pub fn set_failing(&self, collection: Table, failing: bool) {
        let mut set = self.failing.write();
        if failing {
            set.insert(collection);
        } else {
            set.remove(&collection);
        }
    }

    /// Appends a raw document, bypassing `id` validation.
    pub fn insert_raw(&self, collection: Table, document: Value) {
        self.collections
            .write()
            .entry(collection)
            .or_default()
            .push(document);
    }

    /// Snapshot of a collection.
    pub fn documents(&self, collection: Table) -> Vec<Value> {
        self.collections
            .read()
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of data operations served or refused so far (pings excluded).
    pub fn data_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, collection: Table) -> SyncResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(SyncError::remote_unavailable("memory remote is offline"));
        }
        if self.failing.read().contains(&collection) {
            return Err(SyncError::remote_unavailable(format!(
                "collection {collection} is failing"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn ping(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn fetch_all(&self, collection: Table) -> SyncResult<Vec<Value>> {
        self.check(collection)?;
        Ok(self
            .documents(collection)
            .into_iter()
            .map(strip_internal_id)
            .collect())
    }

    async fn find(&self, collection: Table, id: &str) -> SyncResult<Option<Value>> {
        self.check(collection)?;
        Ok(self
            .documents(collection)
            .into_iter()
            .find(|doc| doc.get(ID).and_then(Value::as_str) == Some(id))
            .map(strip_internal_id))
    }

    async fn upsert(&self, collection: Table, document: &Row) -> SyncResult<()> {
        self.check(collection)?;
        let id = document_id(document)?;

        let mut collections = self.collections.write();
        let docs = collections.entry(collection).or_default();
        let value = document.clone().into_value();
        match docs
            .iter_mut()
            .find(|doc| doc.get(ID).and_then(Value::as_str) == Some(id))
        {
            Some(existing) => *existing = value,
            None => docs.push(value),
        }
        Ok(())
    }
}
