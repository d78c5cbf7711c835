//! Course import
//!
//! Imports course-provided tasks into the local store, de-duplicating on
//! `external_source_id`. Import never touches the remote store: the local
//! store is the single write path the application observes, and the sync
//! coordinator mirrors records outward from there.

use crate::error::Result;
use crate::models::{OwnerId, Task, TaskId};
use crate::store::LocalStore;

/// Counts from one import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Newly inserted tasks
    pub imported: usize,
    /// Tasks skipped because their source is already present locally (or
    /// carries no source id)
    pub skipped: usize,
}

/// Insert `incoming` course tasks for `owner`, skipping any whose
/// `external_source_id` already exists locally.
///
/// Incoming ids are discarded; the local store assigns fresh ones.
pub async fn import_course_tasks(
    local: &dyn LocalStore,
    owner: &OwnerId,
    incoming: Vec<Task>,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for mut task in incoming {
        let Some(source_id) = task
            .external_source_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
        else {
            tracing::warn!(title = %task.title, "Skipping course task without source id");
            summary.skipped += 1;
            continue;
        };

        if local.get_by_external_source_id(&source_id).await?.is_some() {
            summary.skipped += 1;
            continue;
        }

        task.id = TaskId::UNASSIGNED;
        task.owner_id = owner.clone();
        local.insert(task).await?;
        summary.imported += 1;
    }

    tracing::debug!(
        imported = summary.imported,
        skipped = summary.skipped,
        "Course import finished"
    );
    Ok(summary)
}
