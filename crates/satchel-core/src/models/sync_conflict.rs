//! Sync conflict model

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Task, TaskId};

/// A unique identifier for a detected conflict, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A task field compared during conflict detection
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskField {
    Title,
    Subject,
    DueDate,
    IsCompleted,
    ReminderAt,
}

impl TaskField {
    /// Field name as it appears in conflict reports
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Subject => "subject",
            Self::DueDate => "due_date",
            Self::IsCompleted => "is_completed",
            Self::ReminderAt => "reminder_at",
        }
    }
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classification of a detected divergence.
///
/// Detection currently produces `ContentModified` only; the remaining
/// variants are reserved classifications the resolution switch still
/// handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides changed the same record
    ContentModified,
    /// Record deleted locally while the remote copy changed
    DeletedLocally,
    /// Record deleted remotely while the local copy changed
    DeletedRemotely,
    /// Same external source imported independently on both sides
    CreationConflict,
}

impl ConflictKind {
    /// Strategy suggested when the user has not picked one
    #[must_use]
    pub const fn suggested_strategy(self) -> ResolutionStrategy {
        match self {
            Self::ContentModified => ResolutionStrategy::PreferNewest,
            Self::DeletedLocally => ResolutionStrategy::PreferRemote,
            Self::DeletedRemotely => ResolutionStrategy::PreferLocal,
            Self::CreationConflict => ResolutionStrategy::MergeContent,
        }
    }
}

/// Named policy for collapsing a conflict into one surviving record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    PreferLocal,
    PreferRemote,
    PreferNewest,
    MergeContent,
    /// Resolution deferred to the caller; without follow-up this keeps the
    /// local copy
    AskUser,
}

/// A detected divergence between the local and remote version of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict identifier
    pub id: ConflictId,
    /// Task both versions describe
    pub task_id: TaskId,
    /// Local version at detection time
    pub local: Task,
    /// Remote version at detection time
    pub remote: Task,
    /// Divergence classification
    pub kind: ConflictKind,
    /// Fields that differ between the two versions
    pub differences: BTreeSet<TaskField>,
    /// Detection timestamp
    pub detected_at: DateTime<Utc>,
}

impl SyncConflict {
    /// Record a content conflict between two versions of the same task
    #[must_use]
    pub fn content_modified(local: Task, remote: Task, differences: BTreeSet<TaskField>) -> Self {
        Self {
            id: ConflictId::new(),
            task_id: local.id,
            local,
            remote,
            kind: ConflictKind::ContentModified,
            differences,
            detected_at: Utc::now(),
        }
    }

    /// Whether this entry is older than the retention window
    #[must_use]
    pub fn is_older_than(&self, window: Duration) -> bool {
        Utc::now()
            .signed_duration_since(self.detected_at)
            .to_std()
            .is_ok_and(|age| age > window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OwnerId;

    fn sample_pair() -> (Task, Task) {
        let mut local = Task::draft(OwnerId::new("alice"), "Read chapter 4", "History");
        local.id = TaskId::new(1);
        let mut remote = local.clone();
        remote.title = "Read chapters 4-5".to_string();
        (local, remote)
    }

    #[test]
    fn test_conflict_id_unique() {
        assert_ne!(ConflictId::new(), ConflictId::new());
    }

    #[test]
    fn test_conflict_id_parse() {
        let id = ConflictId::new();
        let parsed: ConflictId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_field_names() {
        assert_eq!(TaskField::DueDate.to_string(), "due_date");
        assert_eq!(TaskField::IsCompleted.name(), "is_completed");
    }

    #[test]
    fn test_content_modified_captures_both_versions() {
        let (local, remote) = sample_pair();
        let conflict = SyncConflict::content_modified(
            local.clone(),
            remote.clone(),
            BTreeSet::from([TaskField::Title]),
        );
        assert_eq!(conflict.task_id, local.id);
        assert_eq!(conflict.kind, ConflictKind::ContentModified);
        assert_eq!(conflict.local, local);
        assert_eq!(conflict.remote, remote);
    }

    #[test]
    fn test_suggested_strategies_cover_every_kind() {
        assert_eq!(
            ConflictKind::ContentModified.suggested_strategy(),
            ResolutionStrategy::PreferNewest
        );
        assert_eq!(
            ConflictKind::DeletedLocally.suggested_strategy(),
            ResolutionStrategy::PreferRemote
        );
        assert_eq!(
            ConflictKind::DeletedRemotely.suggested_strategy(),
            ResolutionStrategy::PreferLocal
        );
        assert_eq!(
            ConflictKind::CreationConflict.suggested_strategy(),
            ResolutionStrategy::MergeContent
        );
    }

    #[test]
    fn test_retention_window() {
        let (local, remote) = sample_pair();
        let mut conflict =
            SyncConflict::content_modified(local, remote, BTreeSet::from([TaskField::Title]));
        assert!(!conflict.is_older_than(Duration::from_secs(60)));

        conflict.detected_at = Utc::now() - chrono::Duration::hours(25);
        assert!(conflict.is_older_than(Duration::from_secs(24 * 60 * 60)));
    }
}
