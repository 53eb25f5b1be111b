//! Timers driving scheduled syncs and daily backups.
//!
//! Both loops re-read the settings on every tick, so changes made through the
//! operator API apply from the next tick on.

use crate::engine::SyncEngine;
use crate::report::SyncReport;
use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Wait used when `backup_time` cannot be interpreted.
const BACKUP_RETRY: Duration = Duration::from_secs(3600);

/// Handles of the running timer tasks.
#[derive(Debug)]
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    sync_task: JoinHandle<()>,
    backup_task: JoinHandle<()>,
}

impl Scheduler {
    /// Starts the sync and backup timers.
    ///
    /// The first cycle runs immediately when `auto_sync` is on; later cycles
    /// follow every `sync_interval_minutes`.
    pub fn start(engine: Arc<SyncEngine>) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let sync_task = tokio::spawn(sync_loop(engine.clone(), rx.clone()));
        let backup_task = tokio::spawn(backup_loop(engine, rx));
        info!("scheduler started");
        Self {
            shutdown,
            sync_task,
            backup_task,
        }
    }

    /// Stops both timers, letting a running cycle finish first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.sync_task.await {
            error!("sync timer ended abnormally: {e}");
        }
        if let Err(e) = self.backup_task.await {
            error!("backup timer ended abnormally: {e}");
        }
        info!("scheduler stopped");
    }
}

async fn sync_loop(engine: Arc<SyncEngine>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        if engine.settings().auto_sync {
            match engine.full_sync().await {
                Ok(SyncReport::AlreadyRunning) => debug!("scheduled sync skipped, cycle in progress"),
                Ok(report) => debug!(success = report.is_success(), "scheduled sync finished"),
                Err(e) => error!("scheduled sync failed: {e}"),
            }
        }

        let minutes = u64::from(engine.settings().sync_interval_minutes.max(1));
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(minutes * 60)) => {}
            _ = shutdown.changed() => break,
        }
    }
}

async fn backup_loop(engine: Arc<SyncEngine>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let wait = match engine.settings().backup_time_of_day() {
            Ok(at) => until_next(Local::now().naive_local(), at),
            Err(e) => {
                error!("backup timer: {e}");
                BACKUP_RETRY
            }
        };
        debug!(seconds = wait.as_secs(), "next backup check");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        if engine.settings().auto_backup {
            let report = engine.backup().await;
            debug!(success = report.is_success(), "scheduled backup finished");
        }
    }
}

/// Time from `now` until the next occurrence of `at`, always in the future.
pub fn until_next(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let mut next = now.date().and_time(at);
    if next <= now {
        next += TimeDelta::days(1);
    }
    (next - now).to_std().unwrap_or(BACKUP_RETRY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use apelite_core::SyncSettings;
    use apelite_testkit::TestDataRoot;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn next_backup_later_today() {
        let two = NaiveTime::from_hms_opt(2, 0, 0).unwrap();
        assert_eq!(until_next(at(1, 30, 0), two), Duration::from_secs(30 * 60));
    }

    #[test]
    fn next_backup_tomorrow() {
        let two = NaiveTime::from_hms_opt(2, 0, 0).unwrap();
        assert_eq!(until_next(at(2, 0, 0), two), Duration::from_secs(24 * 3600));
        assert_eq!(
            until_next(at(23, 0, 0), two),
            Duration::from_secs(3 * 3600)
        );
    }

    #[tokio::test]
    async fn runs_first_cycle_and_stops() {
        let root = TestDataRoot::new();
        let remote = Arc::new(MemoryRemoteStore::new());
        let engine = Arc::new(SyncEngine::new(
            root.store.clone(),
            remote,
            root.config.clone(),
            root.log.clone(),
            root.backups.clone(),
        ));

        let scheduler = Scheduler::start(engine.clone());
        for _ in 0..100 {
            if engine.stats().cycles_completed > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(engine.stats().cycles_completed, 1);

        tokio::time::timeout(Duration::from_secs(5), scheduler.stop())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn auto_sync_off_skips_cycles() {
        let root = TestDataRoot::with_settings(SyncSettings {
            auto_sync: false,
            ..SyncSettings::default()
        });
        let engine = Arc::new(SyncEngine::new(
            root.store.clone(),
            Arc::new(MemoryRemoteStore::new()),
            root.config.clone(),
            root.log.clone(),
            root.backups.clone(),
        ));

        let scheduler = Scheduler::start(engine.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;
        assert_eq!(engine.stats().cycles_completed, 0);
    }
}
