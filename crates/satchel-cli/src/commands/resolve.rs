use std::path::Path;

use serde::Serialize;

use satchel_core::models::{SyncConflict, Task};
use satchel_core::sync::{merge_task_lists, ConflictResolver};

use crate::cli::StrategyArg;
use crate::commands::common::{format_conflict_lines, format_task_lines, load_snapshot};
use crate::error::CliError;

#[derive(Serialize)]
struct ResolveReport {
    resolved: Vec<Task>,
    conflicts: Vec<SyncConflict>,
}

pub fn run_resolve(
    local_path: &Path,
    remote_path: &Path,
    strategy: Option<StrategyArg>,
    as_json: bool,
) -> Result<(), CliError> {
    let local_tasks = load_snapshot(local_path)?;
    let remote_tasks = load_snapshot(remote_path)?;

    let resolver = ConflictResolver::default();
    let outcome = resolver.resolve_task_conflicts(&local_tasks, &remote_tasks);
    let conflicts = outcome.conflicts;
    let mut resolved = outcome.resolved;

    if let Some(strategy) = strategy {
        for conflict in &conflicts {
            let Some(survivor) = resolver.apply_strategy(conflict.id, strategy.into(), None)
            else {
                continue;
            };
            if let Some(slot) = resolved.iter_mut().find(|task| task.id == survivor.id) {
                *slot = survivor;
            }
        }
    }

    // Resolution output is unordered; borrow the display ordering.
    let resolved = merge_task_lists(&[], &resolved);

    if as_json {
        let report = ResolveReport {
            resolved,
            conflicts,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Resolved {} task(s), {} conflict(s) detected",
        resolved.len(),
        conflicts.len()
    );
    for line in format_task_lines(&resolved) {
        println!("{line}");
    }
    if !conflicts.is_empty() {
        println!();
        println!("Conflicts:");
        for line in format_conflict_lines(&conflicts) {
            println!("  {line}");
        }
        match strategy {
            Some(strategy) => println!("  applied strategy: {strategy:?}"),
            None => println!("  automatic recency picks shown; pass --strategy to override"),
        }
    }
    Ok(())
}
