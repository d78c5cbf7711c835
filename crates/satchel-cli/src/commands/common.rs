use std::fs;
use std::path::Path;

use satchel_core::models::{SyncConflict, Task};

use crate::error::CliError;

/// Load a JSON array of tasks from disk
pub fn load_snapshot(path: &Path) -> Result<Vec<Task>, CliError> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|error| CliError::InvalidSnapshot {
        path: path.display().to_string(),
        reason: error.to_string(),
    })
}

/// One line per task: completion marker, id, subject, title, due date
pub fn format_task_lines(tasks: &[Task]) -> Vec<String> {
    tasks
        .iter()
        .map(|task| {
            let marker = if task.is_completed { "x" } else { " " };
            let due = task
                .due_date
                .as_deref()
                .filter(|date| !date.trim().is_empty())
                .map(|date| format!(" (due {date})"))
                .unwrap_or_default();
            format!("[{marker}] #{} {}: {}{due}", task.id, task.subject, task.title)
        })
        .collect()
}

/// One line per conflict: id, task, differing fields
pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let fields = conflict
                .differences
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{} task #{} differs in [{fields}] (suggest {:?})",
                conflict.id,
                conflict.task_id,
                conflict.kind.suggested_strategy()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use satchel_core::models::{OwnerId, TaskId};

    fn sample_task() -> Task {
        let mut task = Task::draft(OwnerId::new("alice"), "Read chapter 4", "History");
        task.id = TaskId::new(3);
        task.due_date = Some("2024-06-01".to_string());
        task
    }

    #[test]
    fn task_line_includes_due_date() {
        let lines = format_task_lines(&[sample_task()]);
        assert_eq!(lines, vec!["[ ] #3 History: Read chapter 4 (due 2024-06-01)"]);
    }

    #[test]
    fn completed_task_line_is_checked() {
        let mut task = sample_task();
        task.is_completed = true;
        task.due_date = None;
        let lines = format_task_lines(&[task]);
        assert_eq!(lines, vec!["[x] #3 History: Read chapter 4"]);
    }
}
