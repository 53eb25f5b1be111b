//! SQLite schema for the local store.
//!
//! Every replicated table has the same physical shape: the primary key, the
//! two business timestamps, the engine-managed `last_sync`, and a `data` JSON
//! object holding every other column the remote documents carry.

/// Schema version stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: u32 = 1;

/// Connection pragmas applied on every open.
pub const PRAGMAS: &str = r#"
PRAGMA foreign_keys = ON;
PRAGMA synchronous = FULL;
PRAGMA temp_store = MEMORY;
"#;

/// Table definitions. Every statement is idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    created_at TEXT,
    updated_at TEXT,
    last_sync TEXT,
    data TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_users_updated_at ON users(updated_at);

CREATE TABLE IF NOT EXISTS cases (
    id TEXT PRIMARY KEY NOT NULL,
    created_at TEXT,
    updated_at TEXT,
    last_sync TEXT,
    data TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_cases_updated_at ON cases(updated_at);

CREATE TABLE IF NOT EXISTS clients_enhanced (
    id TEXT PRIMARY KEY NOT NULL,
    created_at TEXT,
    updated_at TEXT,
    last_sync TEXT,
    data TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_clients_enhanced_updated_at ON clients_enhanced(updated_at);

CREATE TABLE IF NOT EXISTS evidence (
    id TEXT PRIMARY KEY NOT NULL,
    created_at TEXT,
    updated_at TEXT,
    last_sync TEXT,
    data TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_evidence_updated_at ON evidence(updated_at);

CREATE TABLE IF NOT EXISTS financial_records (
    id TEXT PRIMARY KEY NOT NULL,
    created_at TEXT,
    updated_at TEXT,
    last_sync TEXT,
    data TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_financial_records_updated_at ON financial_records(updated_at);

-- One row per replicated table, upserted after each pull
CREATE TABLE IF NOT EXISTS sync_status (
    table_name TEXT PRIMARY KEY NOT NULL,
    last_sync TEXT,
    sync_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    status TEXT NOT NULL CHECK (status IN ('ok', 'error'))
);

-- Append-only anomaly log
CREATE TABLE IF NOT EXISTS sync_conflicts (
    id TEXT PRIMARY KEY NOT NULL,
    table_name TEXT NOT NULL,
    record_id TEXT,
    local_data TEXT,
    remote_data TEXT,
    conflict_type TEXT NOT NULL,
    resolved INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sync_conflicts_open ON sync_conflicts(table_name, record_id, resolved);
"#;
