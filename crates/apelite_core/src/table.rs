//! Replicated tables and rows.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Primary key column.
pub const ID: &str = "id";
/// Creation timestamp column.
pub const CREATED_AT: &str = "created_at";
/// Modification timestamp column.
pub const UPDATED_AT: &str = "updated_at";
/// Column managed by the sync engine; never sent to the remote store.
pub const LAST_SYNC: &str = "last_sync";

/// A table mirrored between the local store and the remote document store.
///
/// The SQLite table and the remote collection share the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Operator and client accounts.
    Users,
    /// Investigation cases.
    Cases,
    /// Client records.
    ClientsEnhanced,
    /// Evidence items attached to cases.
    Evidence,
    /// Invoices, payments and expenses.
    FinancialRecords,
}

impl Table {
    /// Every replicated table, in processing order.
    pub const ALL: [Table; 5] = [
        Table::Users,
        Table::Cases,
        Table::ClientsEnhanced,
        Table::Evidence,
        Table::FinancialRecords,
    ];

    /// Table and collection name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Cases => "cases",
            Table::ClientsEnhanced => "clients_enhanced",
            Table::Evidence => "evidence",
            Table::FinancialRecords => "financial_records",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::unknown_table(s))
    }
}

/// A replicated row: a JSON object with at least an `id` string.
///
/// Business columns are opaque to the engine; only `id`, `created_at`,
/// `updated_at` and `last_sync` are interpreted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON object without validation.
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Validates a document received from the remote store.
    ///
    /// The document must be a JSON object whose `id` is a non-empty string.
    pub fn from_remote(value: Value) -> CoreResult<Self> {
        let Value::Object(map) = value else {
            return Err(CoreError::malformed("document is not a JSON object"));
        };
        match map.get(ID) {
            Some(Value::String(id)) if !id.is_empty() => Ok(Self(map)),
            Some(Value::String(_)) => Err(CoreError::malformed("document has an empty id")),
            Some(_) => Err(CoreError::malformed("document id is not a string")),
            None => Err(CoreError::malformed("document has no id")),
        }
    }

    /// Returns the primary key, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.str_field(ID)
    }

    /// Returns `created_at`, if present and a string.
    pub fn created_at(&self) -> Option<&str> {
        self.str_field(CREATED_AT)
    }

    /// Returns `updated_at`, if present and a string.
    pub fn updated_at(&self) -> Option<&str> {
        self.str_field(UPDATED_AT)
    }

    /// Returns `last_sync`, if present and a string.
    pub fn last_sync(&self) -> Option<&str> {
        self.str_field(LAST_SYNC)
    }

    /// Returns a field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Sets `last_sync`.
    pub fn set_last_sync(&mut self, at: impl Into<String>) {
        self.0.insert(LAST_SYNC.to_string(), Value::String(at.into()));
    }

    /// Returns a copy without the engine-managed `last_sync` field.
    #[must_use]
    pub fn without_last_sync(&self) -> Self {
        let mut map = self.0.clone();
        map.remove(LAST_SYNC);
        Self(map)
    }

    /// Overlays every field of `other` onto this row.
    pub fn merge(&mut self, other: Row) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }

    /// Borrows the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the row into its JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Converts the row into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_order_and_names() {
        let names: Vec<_> = Table::ALL.iter().map(Table::as_str).collect();
        assert_eq!(
            names,
            ["users", "cases", "clients_enhanced", "evidence", "financial_records"]
        );
    }

    #[test]
    fn table_parse() {
        assert_eq!("evidence".parse::<Table>().unwrap(), Table::Evidence);
        assert!(matches!(
            "users; DROP TABLE users".parse::<Table>(),
            Err(CoreError::UnknownTable { .. })
        ));
    }

    #[test]
    fn from_remote_accepts_string_id() {
        let row = Row::from_remote(json!({"id": "u1", "name": "A"})).unwrap();
        assert_eq!(row.id(), Some("u1"));
        assert_eq!(row.get("name"), Some(&json!("A")));
    }

    #[test]
    fn from_remote_rejects_bad_documents() {
        assert!(Row::from_remote(json!({"name": "no id"})).is_err());
        assert!(Row::from_remote(json!({"id": 7})).is_err());
        assert!(Row::from_remote(json!({"id": ""})).is_err());
        assert!(Row::from_remote(json!(["id", "u1"])).is_err());
    }

    #[test]
    fn without_last_sync_drops_only_that_field() {
        let mut row = Row::from_remote(json!({"id": "c1", "title": "X"})).unwrap();
        row.set_last_sync("2024-01-01T00:00:00.000Z");
        let pushed = row.without_last_sync();
        assert!(pushed.last_sync().is_none());
        assert_eq!(pushed.len(), 2);
        assert!(row.last_sync().is_some());
    }

    #[test]
    fn merge_overlays_fields() {
        let mut row = Row::from_remote(json!({"id": "c1", "title": "X", "status": "open"})).unwrap();
        row.merge(Row::from_remote(json!({"id": "c1", "status": "closed"})).unwrap());
        assert_eq!(row.get("title"), Some(&json!("X")));
        assert_eq!(row.get("status"), Some(&json!("closed")));
    }
}
