//! In-memory document collections.

use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Internal identifier attached to every stored document.
pub const INTERNAL_ID: &str = "_id";

#[derive(Debug, Default)]
struct Collection {
    /// Documents in insertion order.
    documents: Vec<Map<String, Value>>,
    /// `id` -> position in `documents`.
    index: HashMap<String, usize>,
}

/// Collections of JSON documents keyed by their `id` field.
///
/// Collections spring into existence on first write and read as empty
/// before that.
#[derive(Debug, Default)]
pub struct DocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl DocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document of `collection`, in insertion order.
    pub fn list(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.documents.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// A single document by `id`.
    pub fn get(&self, collection: &str, id: &str) -> ServerResult<Value> {
        let collections = self.collections.read();
        collections
            .get(collection)
            .and_then(|c| c.index.get(id).map(|&pos| &c.documents[pos]))
            .map(|doc| Value::Object(doc.clone()))
            .ok_or_else(|| ServerError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    /// Creates or replaces the document keyed by `id`.
    ///
    /// The body must be an object whose `id`, when present, equals `id`. A
    /// replaced document keeps its internal identifier. Returns true if the
    /// document was created.
    pub fn put(&self, collection: &str, id: &str, body: Value) -> ServerResult<bool> {
        if id.is_empty() {
            return Err(ServerError::InvalidRequest("empty document id".into()));
        }
        let Value::Object(mut document) = body else {
            return Err(ServerError::InvalidRequest(
                "document must be a JSON object".into(),
            ));
        };
        match document.get("id") {
            None => {
                document.insert("id".into(), Value::String(id.to_string()));
            }
            Some(Value::String(body_id)) if body_id == id => {}
            Some(other) => {
                return Err(ServerError::InvalidRequest(format!(
                    "body id {other} does not match path id {id:?}"
                )))
            }
        }
        document.remove(INTERNAL_ID);

        let mut collections = self.collections.write();
        let entry = collections.entry(collection.to_string()).or_default();
        match entry.index.get(id) {
            Some(&pos) => {
                let internal = entry.documents[pos].get(INTERNAL_ID).cloned();
                if let Some(internal) = internal {
                    document.insert(INTERNAL_ID.into(), internal);
                }
                entry.documents[pos] = document;
                Ok(false)
            }
            None => {
                document.insert(INTERNAL_ID.into(), Value::String(new_internal_id()));
                entry.index.insert(id.to_string(), entry.documents.len());
                entry.documents.push(document);
                Ok(true)
            }
        }
    }

    /// Stores a document as-is, without requiring an `id`.
    ///
    /// Seeds stores with documents written by producers that do not follow
    /// the contract. Documents without a string `id` are not reachable by
    /// `get` or `put`.
    pub fn insert_raw(&self, collection: &str, document: Map<String, Value>) {
        let mut document = document;
        document
            .entry(INTERNAL_ID)
            .or_insert_with(|| Value::String(new_internal_id()));

        let mut collections = self.collections.write();
        let entry = collections.entry(collection.to_string()).or_default();
        let id = document.get("id").and_then(Value::as_str).map(str::to_string);
        match id.as_ref().and_then(|id| entry.index.get(id).copied()) {
            Some(pos) => entry.documents[pos] = document,
            None => {
                if let Some(id) = id {
                    entry.index.insert(id, entry.documents.len());
                }
                entry.documents.push(document);
            }
        }
    }

    /// Number of documents in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }

    /// Names of every collection written so far.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn new_internal_id() -> String {
    Uuid::new_v4().simple().to_string()
}
