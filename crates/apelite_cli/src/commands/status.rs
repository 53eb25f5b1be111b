//! Status command.

use super::{print_json, CliResult, Workspace};

/// Prints the system status report.
pub async fn run(workspace: &Workspace) -> CliResult<()> {
    let engine = workspace.engine()?;
    print_json(&engine.system_status().await?)
}
