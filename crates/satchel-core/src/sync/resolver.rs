//! Conflict detection and resolution
//!
//! Pure logic: given a local and a remote snapshot, detect field-level
//! divergence, auto-resolve with the recency heuristic, and keep a pending
//! set for manual resolution. The only shared state is that pending set; all
//! mutation replaces a copied snapshot so readers never observe a partial
//! update.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::SyncOptions;
use crate::models::{ConflictId, ResolutionStrategy, SyncConflict, Task, TaskField, TaskId};

/// Output of one detection pass
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    /// One surviving record per distinct id, conflicted ids carrying their
    /// automatic resolution
    pub resolved: Vec<Task>,
    /// Newly recorded conflicts; divergences already pending with the same
    /// field set are not repeated
    pub conflicts: Vec<SyncConflict>,
}

/// Detects and resolves divergence between two record snapshots
pub struct ConflictResolver {
    pending: Mutex<Vec<SyncConflict>>,
    retention: Duration,
}

impl ConflictResolver {
    /// Create a resolver with the given pending-conflict retention window
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            retention,
        }
    }

    /// Reconcile a local and a remote snapshot.
    ///
    /// Ids on both sides are compared field by field; agreement takes the
    /// remote copy, divergence is classified `ContentModified` and
    /// auto-resolved by recency. Ids on one side only pass through: the
    /// other side has not caught up yet. Output carries one entry per
    /// distinct id; callers re-sort.
    pub fn resolve_task_conflicts(&self, local: &[Task], remote: &[Task]) -> ResolutionOutcome {
        let local_by_id: HashMap<TaskId, &Task> =
            local.iter().map(|task| (task.id, task)).collect();
        let remote_by_id: HashMap<TaskId, &Task> =
            remote.iter().map(|task| (task.id, task)).collect();

        let mut resolved = Vec::with_capacity(local_by_id.len().max(remote_by_id.len()));
        let mut conflicts = Vec::new();

        for (id, remote_task) in &remote_by_id {
            match local_by_id.get(id) {
                // Local has not caught up yet.
                None => resolved.push((*remote_task).clone()),
                Some(local_task) => {
                    let differences = diff_fields(local_task, remote_task);
                    if differences.is_empty() {
                        // Both sides agree; the remote copy is authoritative.
                        resolved.push((*remote_task).clone());
                    } else {
                        resolved.push(pick_newer(local_task, remote_task).clone());
                        if let Some(conflict) =
                            self.record_conflict(local_task, remote_task, differences)
                        {
                            conflicts.push(conflict);
                        }
                    }
                }
            }
        }

        // Remote has not caught up yet.
        for (id, local_task) in &local_by_id {
            if !remote_by_id.contains_key(id) {
                resolved.push((*local_task).clone());
            }
        }

        ResolutionOutcome {
            resolved,
            conflicts,
        }
    }

    /// Apply a manual strategy to a pending conflict.
    ///
    /// Returns the surviving task and removes the pending entry; `None` when
    /// the id is unknown. Resolution never deletes: every strategy yields
    /// exactly one surviving value.
    pub fn apply_strategy(
        &self,
        conflict_id: ConflictId,
        strategy: ResolutionStrategy,
        merged_task: Option<Task>,
    ) -> Option<Task> {
        let conflict = self.take_pending(conflict_id)?;
        let survivor = match strategy {
            ResolutionStrategy::PreferLocal => conflict.local,
            ResolutionStrategy::PreferRemote => conflict.remote,
            ResolutionStrategy::PreferNewest => {
                pick_newer(&conflict.local, &conflict.remote).clone()
            }
            ResolutionStrategy::MergeContent => merged_task
                .unwrap_or_else(|| merge_tasks(&conflict.local, &conflict.remote)),
            // Deferred resolution with no caller follow-up keeps the local
            // copy rather than dropping the record.
            ResolutionStrategy::AskUser => conflict.local,
        };
        tracing::debug!(conflict = %conflict_id, task = %survivor.id, ?strategy, "Resolved conflict");
        Some(survivor)
    }

    /// Snapshot of the pending conflicts
    #[must_use]
    pub fn pending_conflicts(&self) -> Vec<SyncConflict> {
        self.lock_pending().clone()
    }

    /// Number of pending conflicts
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Prune pending conflicts older than the retention window
    pub fn clean_old_conflicts(&self) {
        let mut pending = self.lock_pending();
        let retained: Vec<SyncConflict> = pending
            .iter()
            .filter(|conflict| !conflict.is_older_than(self.retention))
            .cloned()
            .collect();
        if retained.len() != pending.len() {
            tracing::debug!(
                removed = pending.len() - retained.len(),
                "Pruned expired conflicts"
            );
        }
        *pending = retained;
    }

    fn record_conflict(
        &self,
        local: &Task,
        remote: &Task,
        differences: BTreeSet<TaskField>,
    ) -> Option<SyncConflict> {
        let mut pending = self.lock_pending();
        // A divergence already pending with the same field set is not
        // recorded again; it re-appears only once independently observed.
        let already_pending = pending
            .iter()
            .any(|conflict| conflict.task_id == local.id && conflict.differences == differences);
        if already_pending {
            return None;
        }

        let conflict = SyncConflict::content_modified(local.clone(), remote.clone(), differences);
        tracing::debug!(
            task = %conflict.task_id,
            fields = ?conflict.differences,
            "Recorded content conflict"
        );
        let mut next = pending.clone();
        next.push(conflict.clone());
        *pending = next;
        Some(conflict)
    }

    fn take_pending(&self, conflict_id: ConflictId) -> Option<SyncConflict> {
        let mut pending = self.lock_pending();
        let index = pending
            .iter()
            .position(|conflict| conflict.id == conflict_id)?;
        let mut next = pending.clone();
        let conflict = next.remove(index);
        *pending = next;
        Some(conflict)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<SyncConflict>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(SyncOptions::default().conflict_retention)
    }
}

/// Compare the five user-visible fields; empty and absent optional values
/// are equivalent
fn diff_fields(local: &Task, remote: &Task) -> BTreeSet<TaskField> {
    let mut differences = BTreeSet::new();
    if local.title != remote.title {
        differences.insert(TaskField::Title);
    }
    if local.subject != remote.subject {
        differences.insert(TaskField::Subject);
    }
    if normalized(&local.due_date) != normalized(&remote.due_date) {
        differences.insert(TaskField::DueDate);
    }
    if local.is_completed != remote.is_completed {
        differences.insert(TaskField::IsCompleted);
    }
    if normalized(&local.reminder_at) != normalized(&remote.reminder_at) {
        differences.insert(TaskField::ReminderAt);
    }
    differences
}

fn normalized(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Recency heuristic over `created_at` strings.
///
/// Not a true last-write-wins: no modification timestamp exists. Both
/// parseable takes the later instant (tie keeps local); one parseable takes
/// that side; neither parseable takes the non-empty side, defaulting to the
/// local copy.
fn pick_newer<'a>(local: &'a Task, remote: &'a Task) -> &'a Task {
    match (local.parsed_created_at(), remote.parsed_created_at()) {
        (Some(local_at), Some(remote_at)) => {
            if remote_at > local_at {
                remote
            } else {
                local
            }
        }
        (Some(_), None) => local,
        (None, Some(_)) => remote,
        (None, None) => {
            if local.created_at.trim().is_empty() && !remote.created_at.trim().is_empty() {
                remote
            } else {
                local
            }
        }
    }
}

/// Deterministic field-by-field merge: a non-empty local text field wins
/// over the remote value, completion is OR'd, the earlier due date and the
/// local reminder are kept, and `created_at` takes the later of the two.
#[must_use]
pub fn merge_tasks(local: &Task, remote: &Task) -> Task {
    Task {
        id: local.id,
        title: pick_text(&local.title, &remote.title),
        subject: pick_text(&local.subject, &remote.subject),
        due_date: earlier_due_date(&local.due_date, &remote.due_date),
        is_completed: local.is_completed || remote.is_completed,
        created_at: later_created_at(local, remote).to_string(),
        reminder_at: normalized(&local.reminder_at)
            .or_else(|| normalized(&remote.reminder_at))
            .map(str::to_string),
        external_source_id: local
            .external_source_id
            .clone()
            .or_else(|| remote.external_source_id.clone()),
        owner_id: local.owner_id.clone(),
    }
}

fn pick_text(local: &str, remote: &str) -> String {
    if local.trim().is_empty() {
        remote.to_string()
    } else {
        local.to_string()
    }
}

fn earlier_due_date(local: &Option<String>, remote: &Option<String>) -> Option<String> {
    match (normalized(local), normalized(remote)) {
        (Some(local_date), Some(remote_date)) => {
            let pick = match (
                crate::models::parse_timestamp(local_date),
                crate::models::parse_timestamp(remote_date),
            ) {
                (Some(local_at), Some(remote_at)) => {
                    if remote_at < local_at {
                        remote_date
                    } else {
                        local_date
                    }
                }
                // Unparseable dates fall back to lexicographic order.
                _ => {
                    if remote_date < local_date {
                        remote_date
                    } else {
                        local_date
                    }
                }
            };
            Some(pick.to_string())
        }
        (Some(local_date), None) => Some(local_date.to_string()),
        (None, Some(remote_date)) => Some(remote_date.to_string()),
        (None, None) => None,
    }
}

fn later_created_at<'a>(local: &'a Task, remote: &'a Task) -> &'a str {
    match (local.parsed_created_at(), remote.parsed_created_at()) {
        (Some(local_at), Some(remote_at)) => {
            if remote_at > local_at {
                &remote.created_at
            } else {
                &local.created_at
            }
        }
        (Some(_), None) => &local.created_at,
        (None, Some(_)) => &remote.created_at,
        (None, None) => {
            if remote.created_at > local.created_at {
                &remote.created_at
            } else {
                &local.created_at
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OwnerId;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn task(id: i64, title: &str, created_at: &str) -> Task {
        Task {
            id: TaskId::new(id),
            title: title.to_string(),
            subject: "History".to_string(),
            due_date: None,
            is_completed: false,
            created_at: created_at.to_string(),
            reminder_at: None,
            external_source_id: None,
            owner_id: OwnerId::new("alice"),
        }
    }

    #[test]
    fn test_agreement_takes_remote_copy() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Same", "2024-01-01T00:00:00Z")];
        let remote = vec![task(1, "Same", "2024-01-01T00:00:00Z")];

        let outcome = resolver.resolve_task_conflicts(&local, &remote);
        assert_eq!(outcome.resolved, remote);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(resolver.pending_count(), 0);
    }

    #[test]
    fn test_one_sided_ids_pass_through() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Local only", "2024-01-01T00:00:00Z")];
        let remote = vec![task(2, "Remote only", "2024-01-02T00:00:00Z")];

        let outcome = resolver.resolve_task_conflicts(&local, &remote);
        assert_eq!(outcome.resolved.len(), 2);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn test_single_field_divergence_yields_one_survivor_and_one_conflict() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Draft", "2024-01-01T00:00:00Z")];
        let remote = vec![task(1, "Final", "2024-01-02T00:00:00Z")];

        let outcome = resolver.resolve_task_conflicts(&local, &remote);
        assert_eq!(outcome.resolved.len(), 1);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(
            outcome.conflicts[0].differences,
            BTreeSet::from([TaskField::Title])
        );
        // Remote created_at is later, so the automatic pick is the remote copy.
        assert_eq!(outcome.resolved[0].title, "Final");
    }

    #[test]
    fn test_recency_prefers_parseable_side() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Local", "not a date")];
        let remote = vec![task(1, "Remote", "2024-01-02T00:00:00Z")];

        let outcome = resolver.resolve_task_conflicts(&local, &remote);
        assert_eq!(outcome.resolved[0].title, "Remote");
    }

    #[test]
    fn test_recency_defaults_to_local_when_neither_parses() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Local", "???")];
        let remote = vec![task(1, "Remote", "???")];

        let outcome = resolver.resolve_task_conflicts(&local, &remote);
        assert_eq!(outcome.resolved[0].title, "Local");
    }

    #[test]
    fn test_recency_takes_present_side_when_local_blank() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Local", "")];
        let remote = vec![task(1, "Remote", "still not a date")];

        let outcome = resolver.resolve_task_conflicts(&local, &remote);
        assert_eq!(outcome.resolved[0].title, "Remote");
    }

    #[test]
    fn test_resolution_is_idempotent_under_replay() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Draft", "2024-01-01T00:00:00Z")];
        let remote = vec![task(1, "Final", "2024-01-02T00:00:00Z")];

        let first = resolver.resolve_task_conflicts(&local, &remote);
        let second = resolver.resolve_task_conflicts(&local, &remote);

        assert_eq!(first.resolved, second.resolved);
        assert_eq!(second.conflicts.len(), 0);
        assert_eq!(resolver.pending_count(), 1);
    }

    #[test]
    fn test_new_divergence_is_recorded_after_field_set_changes() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Draft", "2024-01-01T00:00:00Z")];
        let remote = vec![task(1, "Final", "2024-01-02T00:00:00Z")];
        resolver.resolve_task_conflicts(&local, &remote);

        let mut remote_again = remote.clone();
        remote_again[0].is_completed = true;
        let outcome = resolver.resolve_task_conflicts(&local, &remote_again);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(resolver.pending_count(), 2);
    }

    #[test]
    fn test_empty_and_absent_optionals_are_equivalent() {
        let resolver = ConflictResolver::default();
        let mut local_task = task(1, "Same", "2024-01-01T00:00:00Z");
        local_task.due_date = Some(String::new());
        let remote_task = task(1, "Same", "2024-01-01T00:00:00Z");

        let outcome = resolver.resolve_task_conflicts(&[local_task], &[remote_task]);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn test_merge_content_field_rules() {
        let mut local = task(1, "A", "2024-01-01T00:00:00Z");
        local.due_date = Some("2024-06-10".to_string());
        local.reminder_at = Some("2024-06-09T08:00:00Z".to_string());
        let mut remote = task(1, "B", "2024-01-02T00:00:00Z");
        remote.is_completed = true;
        remote.due_date = Some("2024-06-01".to_string());

        let merged = merge_tasks(&local, &remote);
        // Non-empty local text wins over the remote value.
        assert_eq!(merged.title, "A");
        // Completion on either side survives.
        assert!(merged.is_completed);
        // The earlier due date is kept.
        assert_eq!(merged.due_date.as_deref(), Some("2024-06-01"));
        // Local reminder is preferred when present.
        assert_eq!(merged.reminder_at.as_deref(), Some("2024-06-09T08:00:00Z"));
        // created_at takes the max of the two.
        assert_eq!(merged.created_at, "2024-01-02T00:00:00Z");
    }

    #[test]
    fn test_merge_content_falls_back_to_remote_for_empty_local_text() {
        let local = task(1, "", "2024-01-01T00:00:00Z");
        let remote = task(1, "Remote title", "2023-01-01T00:00:00Z");

        let merged = merge_tasks(&local, &remote);
        assert_eq!(merged.title, "Remote title");
        assert_eq!(merged.created_at, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_apply_strategy_prefer_remote() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Draft", "2024-01-02T00:00:00Z")];
        let remote = vec![task(1, "Final", "2024-01-01T00:00:00Z")];
        let outcome = resolver.resolve_task_conflicts(&local, &remote);
        let conflict_id = outcome.conflicts[0].id;

        let survivor = resolver
            .apply_strategy(conflict_id, ResolutionStrategy::PreferRemote, None)
            .unwrap();
        assert_eq!(survivor.title, "Final");
        assert_eq!(resolver.pending_count(), 0);
    }

    #[test]
    fn test_apply_strategy_ask_user_keeps_local() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Draft", "2024-01-01T00:00:00Z")];
        let remote = vec![task(1, "Final", "2024-01-02T00:00:00Z")];
        let outcome = resolver.resolve_task_conflicts(&local, &remote);

        let survivor = resolver
            .apply_strategy(outcome.conflicts[0].id, ResolutionStrategy::AskUser, None)
            .unwrap();
        assert_eq!(survivor.title, "Draft");
    }

    #[test]
    fn test_apply_strategy_unknown_id() {
        let resolver = ConflictResolver::default();
        assert!(resolver
            .apply_strategy(ConflictId::new(), ResolutionStrategy::PreferLocal, None)
            .is_none());
    }

    #[test]
    fn test_clean_old_conflicts_prunes_by_age() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Draft", "2024-01-01T00:00:00Z")];
        let remote = vec![task(1, "Final", "2024-01-02T00:00:00Z")];
        resolver.resolve_task_conflicts(&local, &remote);

        {
            let mut pending = resolver.lock_pending();
            pending[0].detected_at = Utc::now() - chrono::Duration::hours(25);
        }
        resolver.clean_old_conflicts();
        assert_eq!(resolver.pending_count(), 0);
    }

    #[test]
    fn test_clean_old_conflicts_keeps_recent_entries() {
        let resolver = ConflictResolver::default();
        let local = vec![task(1, "Draft", "2024-01-01T00:00:00Z")];
        let remote = vec![task(1, "Final", "2024-01-02T00:00:00Z")];
        resolver.resolve_task_conflicts(&local, &remote);

        resolver.clean_old_conflicts();
        assert_eq!(resolver.pending_count(), 1);
    }

}
