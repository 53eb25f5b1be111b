//! The sync engine.
//!
//! One cycle walks the replicated tables in their fixed order. For each table
//! it pulls (remote to local) and then pushes (local to remote), applying the
//! configured conflict policy to rows present on both sides. Remote failures
//! mark the table partial and the cycle moves on; a local store that cannot be
//! written ends the cycle with an error.
//!
//! A cycle runs on its own task, so it finishes even if the caller stops
//! waiting for it. Store and log I/O runs on the blocking pool.

use crate::conflict::{resolve, ConflictChoice, Resolution};
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use crate::report::{DatabaseInfo, StatusReport, SyncReport, TableCount, TableSyncResult};
use crate::state::{SyncStats, TableProgress, TableSyncState};
use apelite_core::{
    now_utc, BackupManager, BackupReport, ConfigStore, ConflictKind, ConflictRecord, CoreError,
    CoreResult, DataRoot, LocalStore, LogLevel, NewConflict, Row, SyncLog, SyncSettings, Table,
    TableStatus,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Ends a cycle's claim on the engine, however the cycle ends.
struct FlightGuard(Arc<Inner>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        *self.0.current.write() = None;
        self.0.running.store(false, Ordering::Release);
    }
}

/// Counters gathered by one direction of one table.
#[derive(Debug, Default)]
struct DirectionCounts {
    written: u64,
    failed: u64,
    malformed: u64,
    conflicts: u64,
}

/// State shared between the engine handle and a running cycle.
struct Inner {
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    config: Arc<ConfigStore>,
    log: Arc<SyncLog>,
    backups: Arc<BackupManager>,
    connectivity: ConnectivityMonitor,
    running: AtomicBool,
    current: RwLock<Option<TableProgress>>,
    last_sync: RwLock<Option<String>>,
    stats: RwLock<SyncStats>,
}

/// Replicates the local store with the remote store.
pub struct SyncEngine {
    inner: Arc<Inner>,
    data_dir: PathBuf,
}

impl SyncEngine {
    /// Creates an engine over its dependencies.
    pub fn new(
        local: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        config: Arc<ConfigStore>,
        log: Arc<SyncLog>,
        backups: Arc<BackupManager>,
    ) -> Self {
        let data_dir = local
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                connectivity: ConnectivityMonitor::new(remote.clone()),
                local,
                remote,
                config,
                log,
                backups,
                running: AtomicBool::new(false),
                current: RwLock::new(None),
                last_sync: RwLock::new(None),
                stats: RwLock::new(SyncStats::default()),
            }),
            data_dir,
        }
    }

    /// Sets the directory whose volume is reported as disk usage.
    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_dir = root.into();
        self
    }

    /// The local store.
    pub fn local(&self) -> &Arc<LocalStore> {
        &self.inner.local
    }

    /// The remote store.
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.inner.remote
    }

    /// The settings store.
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.inner.config
    }

    /// The backup manager.
    pub fn backups(&self) -> &Arc<BackupManager> {
        &self.inner.backups
    }

    /// Current settings.
    pub fn settings(&self) -> SyncSettings {
        self.inner.config.get()
    }

    /// Whether a cycle is running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Table the running cycle is working on.
    pub fn progress(&self) -> Option<TableProgress> {
        *self.inner.current.read()
    }

    /// When the last cycle finished.
    pub fn last_sync(&self) -> Option<String> {
        self.inner.last_sync.read().clone()
    }

    /// Counters since the engine was created.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    fn try_begin(&self) -> Option<FlightGuard> {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(self.inner.clone()))
    }

    /// Runs one sync cycle over every replicated table.
    ///
    /// Returns `AlreadyRunning` without touching anything if a cycle is in
    /// progress, and `Offline` without touching anything if the remote does
    /// not answer. Dropping the returned future does not stop the cycle.
    ///
    /// # Errors
    ///
    /// Fails when the local store cannot be written. Tables processed before
    /// the failure keep their changes.
    pub async fn full_sync(&self) -> SyncResult<SyncReport> {
        let Some(guard) = self.try_begin() else {
            debug!("sync already running");
            return Ok(SyncReport::AlreadyRunning);
        };

        let inner = self.inner.clone();
        let cycle = tokio::spawn(async move {
            let _guard = guard;
            inner.run_cycle().await
        });
        match cycle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = SyncError::aborted(e.to_string());
                self.inner.stats.write().last_error = Some(err.to_string());
                self.inner.note(LogLevel::Error, err.to_string()).await;
                Err(err)
            }
        }
    }

    /// Copies remote rows of `table` into the local store.
    ///
    /// Returns false when the remote collection cannot be read; that outcome
    /// is recorded in `sync_status`. Row-level failures are logged and
    /// skipped.
    pub async fn sync_table_to_local(&self, table: Table) -> SyncResult<bool> {
        self.inner.sync_table_to_local(table).await
    }

    /// Copies local rows of `table` to the remote store, without `last_sync`.
    ///
    /// Returns false when the remote store becomes unavailable.
    pub async fn sync_table_to_remote(&self, table: Table) -> SyncResult<bool> {
        self.inner.sync_table_to_remote(table).await
    }

    /// Read-only snapshot of the engine and its stores. Refreshes the online
    /// flag.
    pub async fn system_status(&self) -> SyncResult<StatusReport> {
        let online = self.inner.connectivity.is_online().await;

        let (database, tables, sync_status) = self
            .inner
            .with_store(|store| {
                let database = DatabaseInfo {
                    path: store.path().display().to_string(),
                    size_bytes: store.file_size()?,
                };
                let tables = Table::ALL
                    .into_iter()
                    .map(|table| {
                        Ok(TableCount {
                            table,
                            rows: store.count(table)?,
                        })
                    })
                    .collect::<CoreResult<Vec<_>>>()?;
                Ok((database, tables, store.sync_status()?))
            })
            .await?;

        let data_dir = self.data_dir.clone();
        let backups = self.inner.backups.clone();
        let volume = tokio::task::spawn_blocking(move || {
            let disk = match DataRoot::new(&data_dir).disk_usage() {
                Ok(usage) => Some(usage),
                Err(e) => {
                    debug!(dir = %data_dir.display(), "disk usage unavailable: {e}");
                    None
                }
            };
            let backup_count = backups.count().unwrap_or_else(|e| {
                warn!("cannot count backups: {e}");
                0
            });
            (disk, backup_count)
        });
        let (disk, backup_count) = volume.await.unwrap_or_else(|e| {
            warn!("volume scan failed: {e}");
            (None, 0)
        });

        Ok(StatusReport {
            online,
            last_sync: self.last_sync(),
            sync_in_progress: self.is_running(),
            current: self.progress().filter(|p| !p.state.is_terminal()),
            database,
            disk,
            tables,
            sync_status,
            backup_count,
            config: self.settings(),
            stats: self.stats(),
        })
    }

    /// Takes a backup off the async executor.
    pub async fn backup(&self) -> BackupReport {
        let backups = self.inner.backups.clone();
        match tokio::task::spawn_blocking(move || backups.create()).await {
            Ok(report) => report,
            Err(e) => {
                self.inner
                    .note(LogLevel::Error, format!("backup task failed: {e}"))
                    .await;
                BackupReport::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Filed conflicts, oldest first.
    pub async fn conflicts(&self, include_resolved: bool) -> SyncResult<Vec<ConflictRecord>> {
        Ok(self
            .inner
            .with_store(move |store| store.conflicts(include_resolved))
            .await?)
    }

    /// Applies an operator's decision to a filed conflict.
    ///
    /// `Local` pushes the filed local payload to the remote store, `Remote`
    /// writes the filed remote payload into the local store, `Dismiss` touches
    /// neither. Malformed documents can only be dismissed.
    pub async fn resolve_conflict(
        &self,
        id: &str,
        choice: ConflictChoice,
    ) -> SyncResult<ConflictRecord> {
        let key = id.to_string();
        let record = self
            .inner
            .with_store(move |store| store.conflict(&key))
            .await?
            .ok_or_else(|| SyncError::ConflictNotFound { id: id.to_string() })?;
        if record.resolved {
            return Err(SyncError::invalid_resolution(format!(
                "conflict {id} is already resolved"
            )));
        }
        let table: Table = record
            .table_name
            .parse()
            .map_err(|e: CoreError| SyncError::invalid_resolution(e.to_string()))?;

        match (record.conflict_type, choice) {
            (_, ConflictChoice::Dismiss) => {}
            (ConflictKind::Malformed, _) => {
                return Err(SyncError::invalid_resolution(
                    "malformed documents can only be dismissed",
                ));
            }
            (ConflictKind::UpdateUpdate, ConflictChoice::Local) => {
                let row = payload(&record, record.local_data.as_ref())?;
                self.inner
                    .remote
                    .upsert(table, &row.without_last_sync())
                    .await?;
            }
            (ConflictKind::UpdateUpdate, ConflictChoice::Remote) => {
                let mut row = payload(&record, record.remote_data.as_ref())?;
                row.set_last_sync(now_utc());
                self.inner
                    .with_store(move |store| store.upsert(table, &row))
                    .await?;
            }
        }

        let key = id.to_string();
        self.inner
            .with_store(move |store| store.mark_conflict_resolved(&key))
            .await?;
        self.inner
            .note(
                LogLevel::Info,
                format!("conflict {id} on {table} resolved ({choice:?})"),
            )
            .await;
        Ok(ConflictRecord {
            resolved: true,
            ..record
        })
    }
}

impl Inner {
    /// Runs `f` against the local store on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&LocalStore) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let local = self.local.clone();
        tokio::task::spawn_blocking(move || f(&local))
            .await
            .map_err(|e| CoreError::storage_unavailable(format!("store task failed: {e}")))?
    }

    /// Appends to the sync log on the blocking pool.
    async fn note(&self, level: LogLevel, message: impl Into<String>) {
        let log = self.log.clone();
        let message = message.into();
        if let Err(e) = tokio::task::spawn_blocking(move || log.log(level, &message)).await {
            debug!("sync log task failed: {e}");
        }
    }

    fn enter(&self, table: Table, state: TableSyncState) {
        let mut current = self.current.write();
        if let Some(prev) = current.filter(|p| p.table == table) {
            if !prev.state.can_transition_to(state) {
                warn!(table = %table, from = ?prev.state, to = ?state, "unexpected table state change");
            }
        }
        *current = Some(TableProgress { table, state });
    }

    async fn run_cycle(&self) -> SyncResult<SyncReport> {
        if !self.connectivity.is_online().await {
            self.note(LogLevel::Warn, "remote store unreachable, sync skipped")
                .await;
            return Ok(SyncReport::Offline);
        }

        self.note(LogLevel::Info, "sync started").await;
        let mut results = Vec::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            match self.sync_table(table).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    self.stats.write().last_error = Some(e.to_string());
                    self.note(LogLevel::Error, format!("sync aborted on {table}: {e}"))
                        .await;
                    return Err(e);
                }
            }
        }

        let last_sync = now_utc();
        *self.last_sync.write() = Some(last_sync.clone());
        self.stats.write().cycles_completed += 1;

        let partial: Vec<_> = results
            .iter()
            .filter(|r| r.state != TableSyncState::Done)
            .map(|r| r.table.as_str())
            .collect();
        if partial.is_empty() {
            self.note(LogLevel::Info, "sync completed").await;
        } else {
            self.note(
                LogLevel::Warn,
                format!("sync completed, partial tables: {}", partial.join(", ")),
            )
            .await;
        }

        Ok(SyncReport::Success { last_sync, results })
    }

    async fn sync_table(&self, table: Table) -> SyncResult<TableSyncResult> {
        self.enter(table, TableSyncState::Idle);

        self.enter(table, TableSyncState::Pulling);
        let outcome = self.sync_table_to_local(table).await;
        let pulled = self.settle(table, "pull", outcome).await?;

        // Push only after a successful pull: a stale local view could
        // overwrite newer remote rows.
        let pushed = if pulled {
            self.enter(table, TableSyncState::Pushing);
            let outcome = self.sync_table_to_remote(table).await;
            self.settle(table, "push", outcome).await?
        } else {
            false
        };

        let result = TableSyncResult::new(table, pulled, pushed);
        self.enter(table, result.state);
        Ok(result)
    }

    /// Keeps fatal errors, turns every other error into a failed direction.
    async fn settle(
        &self,
        table: Table,
        direction: &str,
        outcome: SyncResult<bool>,
    ) -> SyncResult<bool> {
        match outcome {
            Ok(ok) => Ok(ok),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.note(LogLevel::Error, format!("{table}: {direction} failed: {e}"))
                    .await;
                Ok(false)
            }
        }
    }

    async fn sync_table_to_local(&self, table: Table) -> SyncResult<bool> {
        let documents = match self.remote.fetch_all(table).await {
            Ok(documents) => documents,
            Err(e) => {
                let message = e.to_string();
                self.with_store(move |store| {
                    store.record_sync_status(table, 0, TableStatus::Error, Some(&message))
                })
                .await?;
                self.note(LogLevel::Warn, format!("{table}: remote read failed: {e}"))
                    .await;
                return Ok(false);
            }
        };

        let policy = self.config.get().conflict_resolution;
        let local_rows = self.local_index(table).await?;
        let stamp = now_utc();
        let mut counts = DirectionCounts::default();

        for document in &documents {
            let remote = match Row::from_remote(document.clone()) {
                Ok(row) => row.without_last_sync(),
                Err(e) => {
                    counts.malformed += 1;
                    self.note(LogLevel::Warn, format!("{table}: skipped remote document: {e}"))
                        .await;
                    if self
                        .file(NewConflict::malformed(table, document.clone()))
                        .await?
                    {
                        counts.conflicts += 1;
                    }
                    continue;
                }
            };

            let decision = match remote.id().and_then(|id| local_rows.get(id)) {
                Some(local) => resolve(policy, local, &remote),
                None => Resolution::TakeRemote,
            };

            match decision {
                Resolution::TakeRemote => {
                    let mut row = remote;
                    row.set_last_sync(stamp.clone());
                    match self.with_store(move |store| store.upsert(table, &row)).await {
                        Ok(()) => counts.written += 1,
                        Err(e) if e.is_storage_failure() => return Err(e.into()),
                        Err(e) => {
                            counts.failed += 1;
                            warn!(table = %table, "row upsert failed: {e}");
                        }
                    }
                }
                Resolution::TakeLocal => {}
                Resolution::Conflict => {
                    if let Some(local) = remote.id().and_then(|id| local_rows.get(id)) {
                        let entry = NewConflict::update_update(table, local, &remote);
                        if self.file(entry).await? {
                            counts.conflicts += 1;
                            let filed = SyncError::ConflictUpdateUpdate {
                                table: table.to_string(),
                                record_id: remote.id().unwrap_or_default().to_string(),
                            };
                            self.note(LogLevel::Warn, format!("{filed} filed")).await;
                        }
                    }
                }
            }
        }

        let seen = documents.len() as u64;
        self.with_store(move |store| store.record_sync_status(table, seen, TableStatus::Ok, None))
            .await?;
        if counts.failed > 0 {
            self.note(
                LogLevel::Warn,
                format!(
                    "{table}: {} of {} remote rows could not be stored",
                    counts.failed,
                    documents.len()
                ),
            )
            .await;
        }
        self.note(
            LogLevel::Info,
            format!("{table}: {} rows pulled from remote", counts.written),
        )
        .await;

        let mut stats = self.stats.write();
        stats.rows_pulled += counts.written;
        stats.malformed_skipped += counts.malformed;
        stats.conflicts_filed += counts.conflicts;
        Ok(true)
    }

    async fn sync_table_to_remote(&self, table: Table) -> SyncResult<bool> {
        let local_rows = self.with_store(move |store| store.fetch_all(table)).await?;

        let remote_rows: HashMap<String, Row> = match self.remote.fetch_all(table).await {
            Ok(documents) => documents
                .into_iter()
                .filter_map(|doc| Row::from_remote(doc).ok())
                .filter_map(|row| row.id().map(str::to_string).map(|id| (id, row)))
                .collect(),
            Err(e) => {
                self.note(LogLevel::Warn, format!("{table}: remote read failed: {e}"))
                    .await;
                return Ok(false);
            }
        };

        let policy = self.config.get().conflict_resolution;
        let mut counts = DirectionCounts::default();

        for local in &local_rows {
            let decision = match local.id().and_then(|id| remote_rows.get(id)) {
                Some(remote) => resolve(policy, local, remote),
                None => Resolution::TakeLocal,
            };
            if decision != Resolution::TakeLocal {
                continue;
            }

            match self.remote.upsert(table, &local.without_last_sync()).await {
                Ok(()) => counts.written += 1,
                Err(e) if e.is_remote_unavailable() => {
                    self.stats.write().rows_pushed += counts.written;
                    self.note(LogLevel::Warn, format!("{table}: remote write failed: {e}"))
                        .await;
                    return Ok(false);
                }
                Err(e) => {
                    counts.failed += 1;
                    warn!(table = %table, "row push failed: {e}");
                }
            }
        }

        if counts.failed > 0 {
            self.note(
                LogLevel::Warn,
                format!("{table}: {} local rows could not be pushed", counts.failed),
            )
            .await;
        }
        self.note(
            LogLevel::Info,
            format!("{table}: {} rows pushed to remote", counts.written),
        )
        .await;
        self.stats.write().rows_pushed += counts.written;
        Ok(true)
    }

    async fn local_index(&self, table: Table) -> SyncResult<HashMap<String, Row>> {
        Ok(self
            .with_store(move |store| store.fetch_all(table))
            .await?
            .into_iter()
            .filter_map(|row| row.id().map(str::to_string).map(|id| (id, row)))
            .collect())
    }

    /// Files a conflict. Returns true if it was new.
    async fn file(&self, entry: NewConflict) -> SyncResult<bool> {
        let table = entry.table;
        match self.with_store(move |store| store.file_conflict(&entry)).await {
            Ok(id) => Ok(id.is_some()),
            Err(e) if e.is_storage_failure() => Err(e.into()),
            Err(e) => {
                warn!(table = %table, "cannot file conflict: {e}");
                Ok(false)
            }
        }
    }
}

fn payload(record: &ConflictRecord, data: Option<&serde_json::Value>) -> SyncResult<Row> {
    let data = data.cloned().ok_or_else(|| {
        SyncError::invalid_resolution(format!("conflict {} has no payload for that side", record.id))
    })?;
    Row::from_remote(data).map_err(|e| SyncError::malformed(e.to_string()))
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("local", &self.inner.local.path())
            .field("data_dir", &self.data_dir)
            .field("running", &self.is_running())
            .field("current", &self.progress())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use crate::report::TableOutcome;
    use apelite_core::ConflictPolicy;
    use apelite_testkit::{doc, TestDataRoot};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn engine(root: &TestDataRoot, remote: Arc<dyn RemoteStore>) -> SyncEngine {
        SyncEngine::new(
            root.store.clone(),
            remote,
            root.config.clone(),
            root.log.clone(),
            root.backups.clone(),
        )
        .with_data_root(root.path())
    }

    fn set_policy(root: &TestDataRoot, policy: ConflictPolicy) {
        root.config
            .replace(SyncSettings {
                conflict_resolution: policy,
                ..SyncSettings::default()
            })
            .unwrap();
    }

    fn stripped(rows: Vec<Row>) -> Vec<Value> {
        let mut values: Vec<Value> = rows
            .into_iter()
            .map(|r| r.without_last_sync().into_value())
            .collect();
        values.sort_by_key(|v| v["id"].as_str().unwrap_or_default().to_string());
        values
    }

    #[tokio::test]
    async fn cold_start_online() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(
            Table::Users,
            json!({"id": "u1", "name": "A", "updated_at": "2024-01-01T00:00:00Z"}),
        );
        let engine = engine(&root, remote);

        let report = engine.full_sync().await.unwrap();
        let SyncReport::Success { results, .. } = report else {
            panic!("expected success, got {report:?}");
        };
        assert_eq!(results.len(), Table::ALL.len());
        assert!(results.iter().all(|r| r.status == TableOutcome::Success));

        let users = root.store.fetch_all(Table::Users).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id(), Some("u1"));
        assert!(users[0].last_sync().is_some());

        let status = root.store.sync_status().unwrap();
        let users_status = status.iter().find(|s| s.table_name == "users").unwrap();
        assert_eq!(users_status.sync_count, 1);
        assert_eq!(users_status.status, TableStatus::Ok);
        assert!(engine.last_sync().is_some());
    }

    #[tokio::test]
    async fn cold_start_offline_touches_nothing() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(Table::Users, json!({"id": "u1"}));
        remote.set_online(false);
        let engine = engine(&root, remote.clone());

        let report = engine.full_sync().await.unwrap();
        assert_eq!(report, SyncReport::Offline);
        assert_eq!(serde_json::to_value(&report).unwrap(), json!({"status": "offline"}));

        for table in Table::ALL {
            assert_eq!(root.store.count(table).unwrap(), 0);
        }
        assert!(root.store.sync_status().unwrap().is_empty());
        assert_eq!(remote.data_calls(), 0);
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn local_only_write_reaches_remote_without_last_sync() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.set_online(false);
        let engine = engine(&root, remote.clone());

        let mut row = doc(json!({"id": "c1", "title": "X", "updated_at": "2024-02-01T00:00:00Z"}));
        row.set_last_sync("2024-01-15T00:00:00.000Z");
        root.store.upsert(Table::Cases, &row).unwrap();
        assert_eq!(engine.full_sync().await.unwrap(), SyncReport::Offline);

        remote.set_online(true);
        assert!(engine.full_sync().await.unwrap().is_success());

        let cases = remote.documents(Table::Cases);
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0]["id"], json!("c1"));
        assert!(cases[0].get("last_sync").is_none());
    }

    /// Blocks `fetch_all` until released so a cycle can be held open.
    struct GatedRemote {
        inner: MemoryRemoteStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RemoteStore for GatedRemote {
        async fn ping(&self) -> bool {
            self.inner.ping().await
        }

        async fn fetch_all(&self, collection: Table) -> SyncResult<Vec<Value>> {
            if collection == Table::Users {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.fetch_all(collection).await
        }

        async fn find(&self, collection: Table, id: &str) -> SyncResult<Option<Value>> {
            self.inner.find(collection, id).await
        }

        async fn upsert(&self, collection: Table, document: &Row) -> SyncResult<()> {
            self.inner.upsert(collection, document).await
        }
    }

    #[tokio::test]
    async fn concurrent_sync_is_single_flight() {
        let root = TestDataRoot::new();
        let remote = Arc::new(GatedRemote {
            inner: MemoryRemoteStore::new(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let engine = Arc::new(engine(&root, remote.clone()));

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.full_sync().await }
        });
        remote.entered.notified().await;
        assert!(engine.is_running());
        assert_eq!(
            engine.progress().map(|p| p.state),
            Some(TableSyncState::Pulling)
        );

        let calls_before = remote.inner.data_calls();
        let second = engine.full_sync().await.unwrap();
        assert_eq!(second, SyncReport::AlreadyRunning);
        assert_eq!(remote.inner.data_calls(), calls_before);

        remote.release.notify_one();
        // The push step reads users again.
        remote.entered.notified().await;
        remote.release.notify_one();

        let first = first.await.unwrap().unwrap();
        assert!(first.is_success());
        assert!(!engine.is_running());
        assert_eq!(engine.progress(), None);
    }

    /// Slows down every `fetch_all` on cases.
    struct SlowRemote {
        inner: MemoryRemoteStore,
        delay: Duration,
    }

    #[async_trait]
    impl RemoteStore for SlowRemote {
        async fn ping(&self) -> bool {
            self.inner.ping().await
        }

        async fn fetch_all(&self, collection: Table) -> SyncResult<Vec<Value>> {
            if collection == Table::Cases {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.fetch_all(collection).await
        }

        async fn find(&self, collection: Table, id: &str) -> SyncResult<Option<Value>> {
            self.inner.find(collection, id).await
        }

        async fn upsert(&self, collection: Table, document: &Row) -> SyncResult<()> {
            self.inner.upsert(collection, document).await
        }
    }

    #[tokio::test]
    async fn abandoned_sync_still_finishes() {
        let root = TestDataRoot::new();
        let remote = Arc::new(SlowRemote {
            inner: MemoryRemoteStore::new(),
            delay: Duration::from_millis(300),
        });
        remote.inner.insert_raw(Table::Evidence, json!({"id": "e1"}));
        remote.inner.insert_raw(Table::FinancialRecords, json!({"id": "f1"}));
        let engine = engine(&root, remote.clone());

        // The caller gives up while the cycle waits on cases.
        let abandoned = tokio::time::timeout(Duration::from_millis(50), engine.full_sync()).await;
        assert!(abandoned.is_err());
        assert!(engine.is_running());

        tokio::time::timeout(Duration::from_secs(10), async {
            while engine.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(engine.progress(), None);
        assert_eq!(engine.stats().cycles_completed, 1);
        assert!(engine.last_sync().is_some());
        assert_eq!(root.store.count(Table::Evidence).unwrap(), 1);
        assert_eq!(root.store.count(Table::FinancialRecords).unwrap(), 1);
        assert_eq!(root.store.sync_status().unwrap().len(), Table::ALL.len());
    }

    #[tokio::test]
    async fn locked_local_store_ends_the_cycle() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(Table::Users, json!({"id": "u1"}));
        remote.insert_raw(Table::Cases, json!({"id": "c1"}));
        let engine = engine(&root, remote.clone());

        let blocker = rusqlite::Connection::open(root.root.database_path()).unwrap();
        blocker.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let err = engine.full_sync().await.unwrap_err();
        blocker.execute_batch("ROLLBACK").unwrap();
        assert!(err.is_fatal(), "unexpected error: {err}");

        // Users was fetched, nothing after it was.
        assert_eq!(remote.data_calls(), 1);
        let stats = engine.stats();
        assert_eq!(stats.cycles_completed, 0);
        assert!(stats.last_error.is_some());
        assert!(engine.last_sync().is_none());
        assert!(!engine.is_running());
        assert_eq!(engine.progress(), None);

        assert!(root.store.sync_status().unwrap().is_empty());
        assert_eq!(root.store.count(Table::Users).unwrap(), 0);
        assert_eq!(root.store.count(Table::Cases).unwrap(), 0);
        assert!(root.log_contents().contains("sync aborted on users"));

        // The store recovers once the lock is gone.
        assert!(engine.full_sync().await.unwrap().is_success());
        assert_eq!(root.store.count(Table::Cases).unwrap(), 1);
    }

    #[tokio::test]
    async fn malformed_row_is_contained() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(Table::Evidence, json!({"id": "e1", "case_id": "c1"}));
        remote.insert_raw(Table::Evidence, json!({"case_id": "c1", "name": "orphan"}));
        let engine = engine(&root, remote);

        assert!(engine.full_sync().await.unwrap().is_success());

        let evidence = root.store.fetch_all(Table::Evidence).unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].id(), Some("e1"));

        let conflicts = engine.conflicts(false).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].table_name, "evidence");
        assert_eq!(conflicts[0].conflict_type, ConflictKind::Malformed);

        // A second cycle does not file the same anomaly again.
        engine.full_sync().await.unwrap();
        assert_eq!(root.store.conflicts(false).unwrap().len(), 1);
        assert_eq!(engine.stats().malformed_skipped, 2);
    }

    #[tokio::test]
    async fn convergence_to_union_of_ids() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(Table::Cases, json!({"id": "r1", "updated_at": "2024-01-01T00:00:00Z"}));
        remote.insert_raw(Table::Cases, json!({"id": "both", "updated_at": "2024-01-01T00:00:00Z"}));
        root.store
            .upsert(Table::Cases, &doc(json!({"id": "l1", "updated_at": "2024-01-01T00:00:00Z"})))
            .unwrap();
        root.store
            .upsert(Table::Cases, &doc(json!({"id": "both", "updated_at": "2024-03-01T00:00:00Z"})))
            .unwrap();
        let engine = engine(&root, remote.clone());

        assert!(engine.full_sync().await.unwrap().is_success());

        let mut local_ids: Vec<_> = root
            .store
            .fetch_all(Table::Cases)
            .unwrap()
            .into_iter()
            .filter_map(|r| r.id().map(str::to_string))
            .collect();
        local_ids.sort();
        assert_eq!(local_ids, ["both", "l1", "r1"]);

        let remote_both = remote
            .documents(Table::Cases)
            .into_iter()
            .find(|d| d["id"] == json!("both"))
            .unwrap();
        assert_eq!(remote_both["updated_at"], json!("2024-03-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn newest_wins_on_pull() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(
            Table::Users,
            json!({"id": "u1", "name": "remote", "updated_at": "2024-05-01T00:00:00Z"}),
        );
        root.store
            .upsert(
                Table::Users,
                &doc(json!({"id": "u1", "name": "local", "updated_at": "2024-01-01T00:00:00Z"})),
            )
            .unwrap();
        let engine = engine(&root, remote.clone());

        engine.full_sync().await.unwrap();
        let local = root.store.get(Table::Users, "u1").unwrap().unwrap();
        assert_eq!(local.get("name"), Some(&json!("remote")));
        assert_eq!(remote.documents(Table::Users)[0]["name"], json!("remote"));
    }

    #[tokio::test]
    async fn manual_policy_files_and_touches_nothing() {
        let root = TestDataRoot::new();
        set_policy(&root, ConflictPolicy::Manual);
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(
            Table::Cases,
            json!({"id": "c1", "status": "closed", "updated_at": "2024-05-01T00:00:00Z"}),
        );
        root.store
            .upsert(
                Table::Cases,
                &doc(json!({"id": "c1", "status": "open", "updated_at": "2024-04-01T00:00:00Z"})),
            )
            .unwrap();
        let engine = engine(&root, remote.clone());

        engine.full_sync().await.unwrap();
        engine.full_sync().await.unwrap();

        let local = root.store.get(Table::Cases, "c1").unwrap().unwrap();
        assert_eq!(local.get("status"), Some(&json!("open")));
        assert_eq!(remote.documents(Table::Cases)[0]["status"], json!("closed"));

        let conflicts = root.store.conflicts(false).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictKind::UpdateUpdate);
        assert_eq!(conflicts[0].record_id.as_deref(), Some("c1"));
        assert!(root
            .log_contents()
            .contains("update/update conflict on cases row c1 filed"));
    }

    #[tokio::test]
    async fn resolve_conflict_keep_local_then_remote() {
        let root = TestDataRoot::new();
        set_policy(&root, ConflictPolicy::Manual);
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(
            Table::Cases,
            json!({"id": "c1", "status": "closed", "updated_at": "2024-05-01T00:00:00Z"}),
        );
        root.store
            .upsert(
                Table::Cases,
                &doc(json!({"id": "c1", "status": "open", "updated_at": "2024-04-01T00:00:00Z"})),
            )
            .unwrap();
        let engine = engine(&root, remote.clone());
        engine.full_sync().await.unwrap();

        let id = root.store.conflicts(false).unwrap()[0].id.clone();
        let resolved = engine
            .resolve_conflict(&id, ConflictChoice::Local)
            .await
            .unwrap();
        assert!(resolved.resolved);
        assert_eq!(remote.documents(Table::Cases)[0]["status"], json!("open"));
        assert!(root.store.conflicts(false).unwrap().is_empty());

        let again = engine.resolve_conflict(&id, ConflictChoice::Remote).await;
        assert!(matches!(again, Err(SyncError::InvalidResolution { .. })));

        // Sides agree now, so the next cycle files nothing.
        engine.full_sync().await.unwrap();
        assert!(root.store.conflicts(false).unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_conflict_keep_remote() {
        let root = TestDataRoot::new();
        set_policy(&root, ConflictPolicy::Manual);
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(
            Table::Users,
            json!({"id": "u1", "name": "remote", "updated_at": "2024-05-01T00:00:00Z"}),
        );
        root.store
            .upsert(
                Table::Users,
                &doc(json!({"id": "u1", "name": "local", "updated_at": "2024-06-01T00:00:00Z"})),
            )
            .unwrap();
        let engine = engine(&root, remote);
        engine.full_sync().await.unwrap();

        let id = root.store.conflicts(false).unwrap()[0].id.clone();
        engine
            .resolve_conflict(&id, ConflictChoice::Remote)
            .await
            .unwrap();
        let local = root.store.get(Table::Users, "u1").unwrap().unwrap();
        assert_eq!(local.get("name"), Some(&json!("remote")));
        assert!(local.last_sync().is_some());
    }

    #[tokio::test]
    async fn malformed_conflicts_can_only_be_dismissed() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(Table::Evidence, json!({"name": "orphan"}));
        let engine = engine(&root, remote);
        engine.full_sync().await.unwrap();

        let id = root.store.conflicts(false).unwrap()[0].id.clone();
        assert!(matches!(
            engine.resolve_conflict(&id, ConflictChoice::Local).await,
            Err(SyncError::InvalidResolution { .. })
        ));
        engine
            .resolve_conflict(&id, ConflictChoice::Dismiss)
            .await
            .unwrap();
        assert!(matches!(
            engine.resolve_conflict("missing", ConflictChoice::Dismiss).await,
            Err(SyncError::ConflictNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn failing_table_is_partial_and_others_continue() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(Table::Users, json!({"id": "u1"}));
        remote.insert_raw(Table::FinancialRecords, json!({"id": "f1"}));
        let engine = engine(&root, remote.clone());

        // Establish a count, then break one collection.
        engine.full_sync().await.unwrap();
        remote.set_failing(Table::Users, true);

        let SyncReport::Success { results, .. } = engine.full_sync().await.unwrap() else {
            panic!("expected success");
        };
        let users = &results[0];
        assert_eq!(users.table, Table::Users);
        assert!(!users.remote_to_local);
        assert_eq!(users.status, TableOutcome::Partial);
        assert_eq!(users.state, TableSyncState::Failed);
        assert!(results[1..].iter().all(|r| r.status == TableOutcome::Success));
        assert_eq!(root.store.count(Table::FinancialRecords).unwrap(), 1);

        let status = root.store.sync_status().unwrap();
        assert_eq!(status[0].table_name, "users");
        assert_eq!(status[0].status, TableStatus::Error);
        assert_eq!(status[0].sync_count, 1);
        assert!(status[0].last_error.is_some());
    }

    #[tokio::test]
    async fn pull_and_push_are_idempotent() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(Table::Cases, json!({"id": "c1", "title": "A", "updated_at": "2024-01-01T00:00:00Z"}));
        remote.insert_raw(Table::Cases, json!({"id": "c2", "title": "B"}));
        root.store
            .upsert(Table::Cases, &doc(json!({"id": "c3", "title": "C", "updated_at": "2024-02-01T00:00:00Z"})))
            .unwrap();
        let engine = engine(&root, remote.clone());

        assert!(engine.sync_table_to_local(Table::Cases).await.unwrap());
        let once = stripped(root.store.fetch_all(Table::Cases).unwrap());
        assert!(engine.sync_table_to_local(Table::Cases).await.unwrap());
        assert_eq!(stripped(root.store.fetch_all(Table::Cases).unwrap()), once);

        assert!(engine.sync_table_to_remote(Table::Cases).await.unwrap());
        let mut pushed_once = remote.documents(Table::Cases);
        assert!(engine.sync_table_to_remote(Table::Cases).await.unwrap());
        let mut pushed_twice = remote.documents(Table::Cases);
        pushed_once.sort_by_key(|v| v["id"].to_string());
        pushed_twice.sort_by_key(|v| v["id"].to_string());
        assert_eq!(pushed_once, pushed_twice);
        assert_eq!(pushed_twice.len(), 3);
    }

    #[tokio::test]
    async fn status_report_is_complete() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.insert_raw(Table::Users, json!({"id": "u1"}));
        let engine = engine(&root, remote);
        engine.full_sync().await.unwrap();
        assert!(engine.backup().await.is_success());

        let status = engine.system_status().await.unwrap();
        assert!(status.online);
        assert!(!status.sync_in_progress);
        assert!(status.last_sync.is_some());
        assert_eq!(status.tables.len(), Table::ALL.len());
        assert_eq!(status.tables[0].rows, 1);
        assert_eq!(status.sync_status.len(), Table::ALL.len());
        assert_eq!(status.backup_count, 1);
        assert!(status.database.size_bytes > 0);
        assert!(status.disk.is_some());
        assert_eq!(status.config, root.config.get());
        assert_eq!(status.stats.cycles_completed, 1);

        let value = serde_json::to_value(&status).unwrap();
        for key in ["online", "last_sync", "sync_in_progress", "database", "disk", "tables", "sync_status", "backup_count", "config"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
