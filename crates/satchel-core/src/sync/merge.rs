//! Display merge of local and remote snapshots

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{Task, TaskId};

/// Combine a local and a remote snapshot into the single list the
/// application observes.
///
/// Remote entries are authoritative; local-only ids (not yet visible
/// remotely) are appended. The result is ordered incomplete-before-complete,
/// then newest first within each group. This is a display merge, tolerant of
/// transient disagreement: no conflict resolution happens here.
#[must_use]
pub fn merge_task_lists(local: &[Task], remote: &[Task]) -> Vec<Task> {
    let remote_ids: HashSet<TaskId> = remote.iter().map(|task| task.id).collect();

    let mut merged: Vec<Task> = remote.to_vec();
    merged.extend(
        local
            .iter()
            .filter(|task| !remote_ids.contains(&task.id))
            .cloned(),
    );

    merged.sort_by(compare_for_display);
    merged
}

/// Incomplete before complete, then `created_at` descending; unparseable
/// timestamps sort after parseable ones, compared lexicographically among
/// themselves
fn compare_for_display(a: &Task, b: &Task) -> Ordering {
    a.is_completed.cmp(&b.is_completed).then_with(|| {
        match (a.parsed_created_at(), b.parsed_created_at()) {
            (Some(a_at), Some(b_at)) => b_at.cmp(&a_at),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.created_at.cmp(&a.created_at),
        }
    })
}
