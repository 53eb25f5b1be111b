//! One-shot sync command.

use super::{print_json, CliResult, Workspace};
use apelite_sync_engine::{SyncReport, TableOutcome};
use tracing::{info, warn};

/// Runs one cycle and prints the report.
pub async fn run(workspace: &Workspace) -> CliResult<()> {
    let engine = workspace.engine()?;
    let report = engine.full_sync().await?;
    match &report {
        SyncReport::Success { results, .. } => {
            let partial = results
                .iter()
                .filter(|r| r.status == TableOutcome::Partial)
                .count();
            info!(tables = results.len(), partial, "sync finished");
        }
        SyncReport::Offline => warn!("remote store unreachable, nothing synced"),
        SyncReport::AlreadyRunning => {}
    }
    print_json(&report)
}
