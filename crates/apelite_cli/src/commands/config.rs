//! Settings commands.

use super::{print_json, CliResult, Workspace};
use serde_json::{Map, Value};

/// Prints the current settings.
pub fn show(workspace: &Workspace) -> CliResult<()> {
    print_json(&workspace.config_store()?.get())
}

/// Sets one setting and prints the result.
pub fn set(workspace: &Workspace, key: &str, value: &str) -> CliResult<()> {
    let mut patch = Map::new();
    patch.insert(key.to_string(), parse_value(value));
    let settings = workspace.config_store()?.update(&patch)?;
    print_json(&settings)
}

/// Reads `raw` as JSON, or as a plain string when it is not valid JSON.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
