use std::path::Path;

use satchel_core::sync::merge_task_lists;

use crate::commands::common::{format_task_lines, load_snapshot};
use crate::error::CliError;

pub fn run_merge(local_path: &Path, remote_path: &Path, as_json: bool) -> Result<(), CliError> {
    let local_tasks = load_snapshot(local_path)?;
    let remote_tasks = load_snapshot(remote_path)?;

    let merged = merge_task_lists(&local_tasks, &remote_tasks);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&merged)?);
        return Ok(());
    }

    for line in format_task_lines(&merged) {
        println!("{line}");
    }
    Ok(())
}
