//! Operator-facing sync log.
//!
//! Appends `[YYYY-MM-DD HH:MM:SS] LEVEL: message` lines (local time) to
//! `logs/sync.log` and mirrors each line as a `tracing` event. A failed write
//! never reaches the caller.

use chrono::Local;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Severity of a sync log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Normal progress.
    Info,
    /// Recovered problem.
    Warn,
    /// Failed operation.
    Error,
}

impl LogLevel {
    /// Label written to the file.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only sync log file.
#[derive(Debug)]
pub struct SyncLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SyncLog {
    /// Logs to `path`. The file and its directory are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logs at `INFO`.
    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message.as_ref());
    }

    /// Logs at `WARN`.
    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message.as_ref());
    }

    /// Logs at `ERROR`.
    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message.as_ref());
    }

    /// Writes one line.
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => tracing::info!(target: "apelite::sync", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "apelite::sync", "{message}"),
            LogLevel::Error => tracing::error!(target: "apelite::sync", "{message}"),
        }

        let line = format_line(level, message);
        let _guard = self.write_lock.lock();
        if let Err(e) = self.append(&line) {
            tracing::debug!(path = %self.path.display(), "sync log write failed: {e}");
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

fn format_line(level: LogLevel, message: &str) -> String {
    format!(
        "[{}] {}: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        level,
        message
    )
}
