//! SQLite-backed local store.
//!
//! The store owns the embedded database file for the lifetime of the process.
//! An advisory lock on `<db>.lock` keeps a second process (or a second handle in
//! the same process) from opening it, and a mutex serializes every statement.

use crate::error::{CoreError, CoreResult};
use crate::schema::{PRAGMAS, SCHEMA, SCHEMA_VERSION};
use crate::table::{Row, Table, CREATED_AT, ID, LAST_SYNC, UPDATED_AT};
use crate::time::now_utc;
use fs2::FileExt;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome recorded in `sync_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Last pull succeeded.
    Ok,
    /// Last pull failed; `last_error` holds the reason.
    Error,
}

impl TableStatus {
    /// Value stored in the `status` column.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Ok => "ok",
            TableStatus::Error => "error",
        }
    }

    fn parse(value: &str) -> Self {
        if value == "ok" {
            TableStatus::Ok
        } else {
            TableStatus::Error
        }
    }
}

/// A row of `sync_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusRow {
    /// Replicated table name.
    pub table_name: String,
    /// When the row was last written.
    pub last_sync: Option<String>,
    /// Number of remote rows seen by the last successful pull.
    pub sync_count: u64,
    /// Error message of the last failed pull.
    pub last_error: Option<String>,
    /// Outcome of the last pull.
    pub status: TableStatus,
}

/// Kind of anomaly filed in `sync_conflicts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// A remote document without a usable `id`.
    Malformed,
    /// Both sides changed the row and the policy is `manual`.
    UpdateUpdate,
}

impl ConflictKind {
    /// Value stored in the `conflict_type` column.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::Malformed => "malformed",
            ConflictKind::UpdateUpdate => "update_update",
        }
    }

    fn parse(value: &str) -> CoreResult<Self> {
        match value {
            "malformed" => Ok(ConflictKind::Malformed),
            "update_update" => Ok(ConflictKind::UpdateUpdate),
            other => Err(CoreError::malformed(format!("unknown conflict type: {other}"))),
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conflict about to be filed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConflict {
    /// Table the row belongs to.
    pub table: Table,
    /// Row id, when the document has one.
    pub record_id: Option<String>,
    /// Local payload.
    pub local_data: Option<Value>,
    /// Remote payload.
    pub remote_data: Option<Value>,
    /// Conflict kind.
    pub kind: ConflictKind,
}

impl NewConflict {
    /// A remote document that could not be replicated.
    pub fn malformed(table: Table, remote_data: Value) -> Self {
        let record_id = remote_data
            .get(ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        Self {
            table,
            record_id,
            local_data: None,
            remote_data: Some(remote_data),
            kind: ConflictKind::Malformed,
        }
    }

    /// A row changed on both sides.
    pub fn update_update(table: Table, local: &Row, remote: &Row) -> Self {
        Self {
            table,
            record_id: remote.id().map(str::to_string),
            local_data: Some(local.without_last_sync().into_value()),
            remote_data: Some(remote.without_last_sync().into_value()),
            kind: ConflictKind::UpdateUpdate,
        }
    }
}

/// A row of `sync_conflicts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Conflict id.
    pub id: String,
    /// Table the row belongs to.
    pub table_name: String,
    /// Row id, when known.
    pub record_id: Option<String>,
    /// Local payload.
    pub local_data: Option<Value>,
    /// Remote payload.
    pub remote_data: Option<Value>,
    /// Conflict kind.
    pub conflict_type: ConflictKind,
    /// Whether an operator resolved it.
    pub resolved: bool,
    /// When it was filed.
    pub created_at: String,
}

/// The embedded relational store.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    conn: Mutex<Connection>,
    _lock_file: File,
}

impl LocalStore {
    /// Opens (creating if absent) the database file and bootstraps the schema.
    ///
    /// # Errors
    ///
    /// - `StoreLocked` if another handle owns the file
    /// - `StorageUnavailable` if the file or its directory cannot be created,
    ///   opened, or initialized
    pub fn open(path: &Path) -> CoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                CoreError::storage_unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(path))
            .map_err(|e| {
                CoreError::storage_unavailable(format!("cannot open lock for {}: {e}", path.display()))
            })?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        let conn = Connection::open(path).map_err(|e| {
            CoreError::storage_unavailable(format!("cannot open {}: {e}", path.display()))
        })?;

        let store = Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
            _lock_file: lock_file,
        };
        store.initialize().map_err(|e| match e {
            CoreError::StorageUnavailable { .. } => e,
            other => CoreError::storage_unavailable(format!(
                "cannot initialize {}: {other}",
                path.display()
            )),
        })?;
        Ok(store)
    }

    /// Creates the replicated and bookkeeping tables. Idempotent.
    pub fn initialize(&self) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(PRAGMAS)?;

        let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        conn.execute_batch(SCHEMA)?;
        if version < SCHEMA_VERSION {
            info!(path = %self.path.display(), "initialized local store schema v{SCHEMA_VERSION}");
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        } else {
            debug!(path = %self.path.display(), "local store schema up to date");
        }
        Ok(())
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the database file in bytes.
    pub fn file_size(&self) -> CoreResult<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Every row of `table`, in unspecified order.
    pub fn fetch_all(&self, table: Table) -> CoreResult<Vec<Row>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, created_at, updated_at, last_sync, data FROM {table}"
        ))?;
        let raw = stmt
            .query_map([], read_raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawRow::into_row).collect()
    }

    /// A single row by id.
    pub fn get(&self, table: Table, id: &str) -> CoreResult<Option<Row>> {
        let conn = self.conn.lock();
        select_row(&conn, table, id)
    }

    /// Inserts `row`, or updates every column it carries if the id exists.
    ///
    /// Runs in its own transaction, so each row commits atomically.
    pub fn upsert(&self, table: Table, row: &Row) -> CoreResult<()> {
        let id = row
            .id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CoreError::malformed(format!("row for {table} has no string id")))?
            .to_string();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut merged = select_row(&tx, table, &id)?.unwrap_or_default();
        merged.merge(row.clone());
        write_row(&tx, table, &id, merged)?;

        tx.commit()?;
        Ok(())
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: Table) -> CoreResult<u64> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Upserts the `sync_status` row for `table` stamped with the current time.
    ///
    /// A failed pull keeps the previous `sync_count`.
    pub fn record_sync_status(
        &self,
        table: Table,
        count: u64,
        status: TableStatus,
        error: Option<&str>,
    ) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO sync_status (table_name, last_sync, sync_count, last_error, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(table_name) DO UPDATE SET
                last_sync = excluded.last_sync,
                sync_count = CASE
                    WHEN excluded.status = 'ok' THEN excluded.sync_count
                    ELSE sync_status.sync_count
                END,
                last_error = excluded.last_error,
                status = excluded.status
            "#,
            params![
                table.as_str(),
                now_utc(),
                i64::try_from(count).unwrap_or(i64::MAX),
                error,
                status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// All `sync_status` rows, in replicated-table order.
    pub fn sync_status(&self) -> CoreResult<Vec<SyncStatusRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT table_name, last_sync, sync_count, last_error, status FROM sync_status",
        )?;
        let mut rows = stmt
            .query_map([], |row| {
                let status: String = row.get(4)?;
                Ok(SyncStatusRow {
                    table_name: row.get(0)?,
                    last_sync: row.get(1)?,
                    sync_count: u64::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                    last_error: row.get(3)?,
                    status: TableStatus::parse(&status),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.sort_by_key(|row| {
            Table::ALL
                .iter()
                .position(|t| t.as_str() == row.table_name)
                .unwrap_or(usize::MAX)
        });
        Ok(rows)
    }

    /// Inserts a `sync_conflicts` row and returns its id.
    pub fn append_conflict(&self, entry: &NewConflict) -> CoreResult<String> {
        let conn = self.conn.lock();
        insert_conflict(&conn, entry)
    }

    /// Files `entry` unless an identical unresolved conflict already exists.
    ///
    /// Returns the new id, or `None` when the conflict was already on file.
    pub fn file_conflict(&self, entry: &NewConflict) -> CoreResult<Option<String>> {
        let remote_data = encode_json(entry.remote_data.as_ref())?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let existing: Option<String> = tx
            .query_row(
                r#"
                SELECT id FROM sync_conflicts
                WHERE table_name = ?1 AND record_id IS ?2 AND conflict_type = ?3
                  AND remote_data IS ?4 AND resolved = 0
                LIMIT 1
                "#,
                params![
                    entry.table.as_str(),
                    entry.record_id,
                    entry.kind.as_str(),
                    remote_data,
                ],
                |row| row.get(0),
            )
            .optional()?;

        if existing.is_some() {
            return Ok(None);
        }
        let id = insert_conflict(&tx, entry)?;
        tx.commit()?;
        Ok(Some(id))
    }

    /// Filed conflicts, oldest first.
    pub fn conflicts(&self, include_resolved: bool) -> CoreResult<Vec<ConflictRecord>> {
        let conn = self.conn.lock();
        let sql = if include_resolved {
            "SELECT id, table_name, record_id, local_data, remote_data, conflict_type, resolved, created_at
             FROM sync_conflicts ORDER BY created_at, rowid"
        } else {
            "SELECT id, table_name, record_id, local_data, remote_data, conflict_type, resolved, created_at
             FROM sync_conflicts WHERE resolved = 0 ORDER BY created_at, rowid"
        };
        let mut stmt = conn.prepare(sql)?;
        let raw = stmt
            .query_map([], read_raw_conflict)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawConflict::into_record).collect()
    }

    /// A single conflict by id.
    pub fn conflict(&self, id: &str) -> CoreResult<Option<ConflictRecord>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                "SELECT id, table_name, record_id, local_data, remote_data, conflict_type, resolved, created_at
                 FROM sync_conflicts WHERE id = ?1",
                params![id],
                read_raw_conflict,
            )
            .optional()?;
        raw.map(RawConflict::into_record).transpose()
    }

    /// Marks a conflict resolved.
    pub fn mark_conflict_resolved(&self, id: &str) -> CoreResult<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE sync_conflicts SET resolved = 1 WHERE id = ?1",
            params![id],
        )?;
        if updated == 0 {
            return Err(CoreError::ConflictNotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Runs `f` while no statement can touch the database file.
    ///
    /// Every write commits before releasing the connection, so the file seen
    /// by `f` is a consistent snapshot.
    pub fn with_quiesced<T>(&self, f: impl FnOnce(&Path) -> T) -> T {
        let _conn = self.conn.lock();
        f(&self.path)
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Columns as stored, before the `data` blob is decoded.
struct RawRow {
    id: String,
    created_at: Option<String>,
    updated_at: Option<String>,
    last_sync: Option<String>,
    data: String,
}

impl RawRow {
    fn into_row(self) -> CoreResult<Row> {
        let mut map: Map<String, Value> = match serde_json::from_str(&self.data)? {
            Value::Object(map) => map,
            _ => {
                return Err(CoreError::malformed(format!(
                    "data column of row {} is not a JSON object",
                    self.id
                )))
            }
        };
        map.insert(ID.to_string(), Value::String(self.id));
        for (key, value) in [
            (CREATED_AT, self.created_at),
            (UPDATED_AT, self.updated_at),
            (LAST_SYNC, self.last_sync),
        ] {
            if let Some(value) = value {
                map.insert(key.to_string(), Value::String(value));
            }
        }
        Ok(Row::from_map(map))
    }
}

fn read_raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        last_sync: row.get(3)?,
        data: row.get(4)?,
    })
}

fn select_row(conn: &Connection, table: Table, id: &str) -> CoreResult<Option<Row>> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT id, created_at, updated_at, last_sync, data FROM {table} WHERE id = ?1"
            ),
            params![id],
            read_raw_row,
        )
        .optional()?;
    raw.map(RawRow::into_row).transpose()
}

/// Writes the full row. String timestamps become columns, everything else
/// (including non-string timestamps) stays in the `data` blob.
fn write_row(tx: &Transaction<'_>, table: Table, id: &str, row: Row) -> CoreResult<()> {
    let mut data = row.into_map();
    data.remove(ID);

    let mut take_str = |key: &str| match data.get(key) {
        Some(Value::String(_)) => data.remove(key).and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        }),
        _ => None,
    };
    let created_at = take_str(CREATED_AT);
    let updated_at = take_str(UPDATED_AT);
    let last_sync = take_str(LAST_SYNC);

    tx.execute(
        &format!(
            r#"
            INSERT INTO {table} (id, created_at, updated_at, last_sync, data)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                last_sync = excluded.last_sync,
                data = excluded.data
            "#
        ),
        params![
            id,
            created_at,
            updated_at,
            last_sync,
            serde_json::to_string(&data)?
        ],
    )?;
    Ok(())
}

fn encode_json(value: Option<&Value>) -> CoreResult<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(CoreError::from)
}

fn insert_conflict(conn: &Connection, entry: &NewConflict) -> CoreResult<String> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        r#"
        INSERT INTO sync_conflicts
            (id, table_name, record_id, local_data, remote_data, conflict_type, resolved, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
        "#,
        params![
            id,
            entry.table.as_str(),
            entry.record_id,
            encode_json(entry.local_data.as_ref())?,
            encode_json(entry.remote_data.as_ref())?,
            entry.kind.as_str(),
            now_utc(),
        ],
    )?;
    Ok(id)
}

struct RawConflict {
    id: String,
    table_name: String,
    record_id: Option<String>,
    local_data: Option<String>,
    remote_data: Option<String>,
    conflict_type: String,
    resolved: bool,
    created_at: String,
}

impl RawConflict {
    fn into_record(self) -> CoreResult<ConflictRecord> {
        let decode = |text: Option<String>| -> CoreResult<Option<Value>> {
            text.map(|t| serde_json::from_str(&t))
                .transpose()
                .map_err(CoreError::from)
        };
        Ok(ConflictRecord {
            conflict_type: ConflictKind::parse(&self.conflict_type)?,
            local_data: decode(self.local_data)?,
            remote_data: decode(self.remote_data)?,
            id: self.id,
            table_name: self.table_name,
            record_id: self.record_id,
            resolved: self.resolved,
            created_at: self.created_at,
        })
    }
}

fn read_raw_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawConflict> {
    Ok(RawConflict {
        id: row.get(0)?,
        table_name: row.get(1)?,
        record_id: row.get(2)?,
        local_data: row.get(3)?,
        remote_data: row.get(4)?,
        conflict_type: row.get(5)?,
        resolved: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
    })
}
