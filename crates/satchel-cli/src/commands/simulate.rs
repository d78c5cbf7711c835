//! Scripted sync scenario against in-memory stores.
//!
//! Wires the whole stack the way a client app does: explicitly constructed
//! stores, resolver, and coordinator, no ambient state. The scenario edits
//! one task on both sides, walks through connectivity loss and regain, and
//! finishes with a manual merge.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use satchel_core::models::{OwnerId, ResolutionStrategy, Task, TaskId};
use satchel_core::store::{
    LocalStore, ManualConnectivity, MemoryLocalStore, MemoryRemoteStore, RemoteStore,
};
use satchel_core::sync::{ConflictResolver, SyncCoordinator, SyncState, SyncStatus};
use satchel_core::SyncOptions;

use crate::commands::common::{format_conflict_lines, format_task_lines};
use crate::error::CliError;

const STEP_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn run_simulate() -> Result<(), CliError> {
    let owner = OwnerId::new("demo-student");
    let options = SyncOptions::default();
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(MemoryRemoteStore::new());
    let connectivity = Arc::new(ManualConnectivity::new(true));
    let resolver = Arc::new(ConflictResolver::new(options.conflict_retention));
    let coordinator = SyncCoordinator::new(
        local.clone(),
        remote.clone(),
        connectivity.clone(),
        resolver,
        owner.clone(),
        options,
    );
    let mut status = coordinator.watch_status();

    seed_divergence(&*local, &*remote, &owner).await?;

    println!("Starting realtime sync for {owner}");
    coordinator.start_realtime_sync(&owner).await?;
    // The seeded divergence keeps the state at Error until resolved.
    wait_for_state(&mut status, SyncState::Error).await?;
    report_status(&status.borrow());
    println!("Pending conflicts:");
    for line in format_conflict_lines(&coordinator.pending_conflicts()) {
        println!("  {line}");
    }

    println!();
    println!("Dropping connectivity");
    connectivity.set_online(false);
    wait_for_state(&mut status, SyncState::Offline).await?;
    report_status(&status.borrow());

    println!("Connectivity restored; sync stays stopped until restarted");
    connectivity.set_online(true);
    wait_for_state(&mut status, SyncState::Idle).await?;
    report_status(&status.borrow());

    println!();
    println!("Restarting realtime sync");
    coordinator.start_realtime_sync(&owner).await?;
    wait_for_state(&mut status, SyncState::Error).await?;

    let conflict_id = coordinator
        .pending_conflicts()
        .first()
        .map(|conflict| conflict.id);
    if let Some(conflict_id) = conflict_id {
        println!("Resolving {conflict_id} with merge_content");
        coordinator
            .resolve_conflict_manually(conflict_id, ResolutionStrategy::MergeContent, None)
            .await?;
        wait_for_state(&mut status, SyncState::Synced).await?;
    }
    report_status(&status.borrow());

    println!();
    println!("Merged task list:");
    let merged_tasks = coordinator.watch_tasks().borrow().clone();
    for line in format_task_lines(&merged_tasks) {
        println!("  {line}");
    }

    coordinator.stop_realtime_sync().await;
    println!();
    println!("Stopped; final state: {}", coordinator.current_status().state);
    Ok(())
}

/// One task edited on both sides, plus one task unique to each side
async fn seed_divergence(
    local: &dyn LocalStore,
    remote: &dyn RemoteStore,
    owner: &OwnerId,
) -> Result<(), CliError> {
    let mut shared = seeded_task(owner, 1, "Read chapter 4", "History", "2024-05-01T10:00:00Z");
    local.insert(shared.clone()).await?;
    shared.title = "Read chapters 4-5".to_string();
    shared.is_completed = true;
    shared.created_at = "2024-05-02T08:00:00Z".to_string();
    remote.put(shared).await?;

    remote
        .put(seeded_task(
            owner,
            2,
            "Essay outline",
            "English",
            "2024-05-03T09:00:00Z",
        ))
        .await?;
    local
        .insert(seeded_task(
            owner,
            3,
            "Flashcards",
            "Spanish",
            "2024-05-04T11:00:00Z",
        ))
        .await?;
    Ok(())
}

fn seeded_task(owner: &OwnerId, id: i64, title: &str, subject: &str, created_at: &str) -> Task {
    let mut task = Task::draft(owner.clone(), title, subject);
    task.id = TaskId::new(id);
    task.created_at = created_at.to_string();
    task
}

fn report_status(status: &SyncStatus) {
    let error = status
        .last_error
        .as_deref()
        .map(|message| format!(", last error: {message}"))
        .unwrap_or_default();
    println!(
        "state: {}, synced: {}, pending conflicts: {}{error}",
        status.state, status.synced_count, status.pending_conflict_count
    );
}

async fn wait_for_state(
    status: &mut watch::Receiver<SyncStatus>,
    target: SyncState,
) -> Result<(), CliError> {
    tokio::time::timeout(STEP_TIMEOUT, async {
        while status.borrow().state != target {
            if status.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .map_err(|_| CliError::SimulationTimeout(target.to_string()))
}
