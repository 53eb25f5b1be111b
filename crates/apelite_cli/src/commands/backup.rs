//! Backup commands.

use super::{print_json, CliResult, Workspace};
use apelite_core::BackupReport;

/// Takes a snapshot of the local database.
pub async fn create(workspace: &Workspace) -> CliResult<()> {
    let engine = workspace.engine()?;
    let report = engine.backup().await;
    print_json(&report)?;
    match report {
        BackupReport::Success { .. } => Ok(()),
        BackupReport::Error { message } => Err(format!("backup failed: {message}").into()),
    }
}

/// Lists existing snapshots, newest first.
pub fn list(workspace: &Workspace, format: &str) -> CliResult<()> {
    let engine = workspace.engine()?;
    let entries = engine.backups().list()?;

    if format == "json" {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No backups in {}", engine.backups().backup_dir().display());
        return Ok(());
    }
    println!("{:<40} {:>12}  {}", "FILE", "SIZE", "MODIFIED");
    for entry in &entries {
        println!("{:<40} {:>12}  {}", entry.file_name, entry.size, entry.modified);
    }
    println!("{} backup(s)", entries.len());
    Ok(())
}
