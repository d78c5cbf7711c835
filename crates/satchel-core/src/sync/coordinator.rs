//! Synchronization coordinator
//!
//! Owns the live remote subscription and the sync status the rest of the
//! application observes. Collaborator failures never propagate past this
//! boundary: they become state transitions and log events, and callers only
//! see status streams and result values.
//!
//! Construct one coordinator per session at the composition root and inject
//! its collaborators explicitly; there is no ambient instance. Construction
//! spawns background tasks, so it must happen inside a Tokio runtime.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::SyncOptions;
use crate::error::{Error, Result};
use crate::models::{ConflictId, OwnerId, ResolutionStrategy, SyncConflict, Task};
use crate::store::{
    ConnectivityMonitor, Document, LocalStore, RemoteEvent, RemoteStore, RemoteSubscription,
    SubscriptionCanceller,
};
use crate::sync::merge::merge_task_lists;
use crate::sync::resolver::ConflictResolver;

/// Coordinator phase
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No subscription active; initial state and the state after a stop
    #[default]
    Idle,
    /// Opening the live query
    Connecting,
    /// Applying an incoming snapshot
    Syncing,
    /// Last snapshot applied cleanly
    Synced,
    /// Transport failure or unresolved conflicts; recoverable
    Error,
    /// Connectivity lost; overrides every other state
    Offline,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
            Self::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// Externally visible sync condition, published independently of task data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Current phase
    pub state: SyncState,
    /// Most recent transport-level failure; cleared by the next successful
    /// sync
    pub last_error: Option<String>,
    /// Rows mapped in the last applied snapshot
    pub synced_count: usize,
    /// Conflicts awaiting manual resolution
    pub pending_conflict_count: usize,
}

/// Outcome of one resolution pass, mapped onto the sync state
#[derive(Debug, Clone)]
pub struct ConflictResolutionResult {
    /// One surviving record per distinct id
    pub resolved: Vec<Task>,
    /// Conflicts recorded by this pass
    pub new_conflicts: Vec<SyncConflict>,
    /// Pending conflicts after this pass
    pub pending_conflicts: usize,
}

struct ActiveSubscription {
    canceller: SubscriptionCanceller,
    driver: JoinHandle<()>,
}

impl ActiveSubscription {
    /// Release the remote listener synchronously, then stop the driver
    fn shutdown(self) {
        self.canceller.cancel();
        self.driver.abort();
    }
}

/// State shared between the coordinator and its background tasks
struct Shared {
    local: Arc<dyn LocalStore>,
    resolver: Arc<ConflictResolver>,
    status: watch::Sender<SyncStatus>,
    remote_snapshot: watch::Sender<Vec<Task>>,
    session_owner: OwnerId,
}

impl Shared {
    fn publish_status(&self, mutate: impl FnOnce(&mut SyncStatus)) {
        let mut next = self.status.borrow().clone();
        mutate(&mut next);
        self.status.send_replace(next);
    }

    /// Status update from sync progress; connectivity loss overrides these,
    /// so they never replace `Offline`
    fn publish_status_guarded(&self, mutate: impl FnOnce(&mut SyncStatus)) {
        self.publish_status(|status| {
            if status.state == SyncState::Offline {
                return;
            }
            mutate(status);
        });
    }

    fn set_state(&self, state: SyncState) {
        self.publish_status(|status| status.state = state);
    }

    fn record_error(&self, error: &Error) {
        let message = error.to_string();
        self.publish_status_guarded(|status| {
            status.state = SyncState::Error;
            status.last_error = Some(message);
        });
    }

    async fn handle_event(&self, event: RemoteEvent) {
        match event {
            RemoteEvent::Snapshot(documents) => {
                self.publish_status_guarded(|status| status.state = SyncState::Syncing);
                let tasks = map_documents(documents);
                let synced = tasks.len();
                match self.apply_remote_snapshot(&tasks).await {
                    Ok(result) => {
                        self.remote_snapshot.send_replace(tasks);
                        self.publish_status_guarded(|status| {
                            status.synced_count = synced;
                            status.last_error = None;
                            status.pending_conflict_count = result.pending_conflicts;
                            status.state = if result.pending_conflicts == 0 {
                                SyncState::Synced
                            } else {
                                SyncState::Error
                            };
                        });
                    }
                    Err(error) => {
                        tracing::error!(%error, "Failed to apply remote snapshot");
                        self.record_error(&error);
                    }
                }
            }
            RemoteEvent::TransportError(message) => {
                tracing::error!(error = %message, "Remote subscription transport error");
                // Stale data is worse than none.
                self.remote_snapshot.send_replace(Vec::new());
                self.publish_status_guarded(|status| {
                    status.state = SyncState::Error;
                    status.last_error = Some(message);
                });
            }
        }
    }

    async fn apply_remote_snapshot(&self, remote_tasks: &[Task]) -> Result<ConflictResolutionResult> {
        let local_tasks = self.local.list_by_owner(&self.session_owner).await?;
        let outcome = self
            .resolver
            .resolve_task_conflicts(&local_tasks, remote_tasks);
        self.write_back(&outcome.resolved).await?;
        Ok(ConflictResolutionResult {
            resolved: outcome.resolved,
            new_conflicts: outcome.conflicts,
            pending_conflicts: self.resolver.pending_count(),
        })
    }

    /// Mirror resolved records into the local store. Idempotent under
    /// replay: rewriting an unchanged record is harmless.
    async fn write_back(&self, resolved: &[Task]) -> Result<()> {
        for task in resolved {
            if task.owner_id != self.session_owner {
                // Never write a record attributed to another owner.
                tracing::warn!(
                    task = %task.id,
                    owner = %task.owner_id,
                    "Skipping write for foreign owner"
                );
                continue;
            }
            if self.local.get_by_id(task.id).await?.is_some() {
                self.local.update(task.clone()).await?;
            } else {
                self.local.insert(task.clone()).await?;
            }
        }
        Ok(())
    }
}

/// Map rows to tasks, dropping individually malformed rows without aborting
/// the batch
fn map_documents(documents: Vec<Document>) -> Vec<Task> {
    let mut tasks = Vec::with_capacity(documents.len());
    for document in documents {
        match Task::from_document(&document) {
            Ok(task) => tasks.push(task),
            Err(error) => tracing::warn!(%error, "Dropping malformed remote row"),
        }
    }
    tasks
}

async fn drive_subscription(mut subscription: RemoteSubscription, shared: Arc<Shared>) {
    while let Some(event) = subscription.next_event().await {
        shared.handle_event(event).await;
    }
    tracing::debug!("Remote subscription feed closed");
}

async fn watch_connectivity(
    mut online: watch::Receiver<bool>,
    shared: Arc<Shared>,
    subscription: Arc<Mutex<Option<ActiveSubscription>>>,
) {
    loop {
        if online.changed().await.is_err() {
            break;
        }
        let is_online = *online.borrow_and_update();
        if is_online {
            tracing::debug!("Connectivity regained");
            // Regaining the network never restarts the subscription; the
            // restart stays the caller's call.
            shared.publish_status(|status| {
                if status.state == SyncState::Offline {
                    status.state = SyncState::Idle;
                }
            });
        } else {
            tracing::warn!("Connectivity lost; sync offline");
            if let Some(active) = subscription.lock().await.take() {
                active.shutdown();
            }
            shared.publish_status(|status| status.state = SyncState::Offline);
        }
    }
}

async fn drive_merged_feed(
    mut local_feed: watch::Receiver<Vec<Task>>,
    mut remote_feed: watch::Receiver<Vec<Task>>,
    merged: Arc<watch::Sender<Vec<Task>>>,
) {
    loop {
        {
            let local_tasks = local_feed.borrow_and_update().clone();
            let remote_tasks = remote_feed.borrow_and_update().clone();
            merged.send_replace(merge_task_lists(&local_tasks, &remote_tasks));
        }
        tokio::select! {
            changed = local_feed.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = remote_feed.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("Merged task feed closed");
}

/// Coordinates realtime synchronization between the local store and the
/// remote store for one session owner
pub struct SyncCoordinator {
    shared: Arc<Shared>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    options: SyncOptions,
    merged: Arc<watch::Sender<Vec<Task>>>,
    subscription: Arc<Mutex<Option<ActiveSubscription>>>,
    watcher: JoinHandle<()>,
    feed: JoinHandle<()>,
}

impl SyncCoordinator {
    /// Create a coordinator for one session owner.
    ///
    /// Spawns the connectivity watcher and the merged-feed task; call inside
    /// a Tokio runtime.
    #[must_use]
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        resolver: Arc<ConflictResolver>,
        owner: OwnerId,
        options: SyncOptions,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        let (remote_snapshot, _) = watch::channel(Vec::new());
        let merged = Arc::new(watch::channel(Vec::new()).0);

        let shared = Arc::new(Shared {
            local: Arc::clone(&local),
            resolver,
            status,
            remote_snapshot,
            session_owner: owner.clone(),
        });
        let subscription = Arc::new(Mutex::new(None));

        let watcher = tokio::spawn(watch_connectivity(
            connectivity.watch(),
            Arc::clone(&shared),
            Arc::clone(&subscription),
        ));
        let feed = tokio::spawn(drive_merged_feed(
            local.watch_by_owner(&owner),
            shared.remote_snapshot.subscribe(),
            Arc::clone(&merged),
        ));

        Self {
            shared,
            remote,
            connectivity,
            options,
            merged,
            subscription,
            watcher,
            feed,
        }
    }

    /// Open the live remote query for the session owner.
    ///
    /// Idempotent restart: an active subscription is stopped first, and the
    /// lifecycle lock guarantees at most one live subscription at any point.
    pub async fn start_realtime_sync(&self, owner: &OwnerId) -> Result<()> {
        self.ensure_session_owner(owner)?;

        let mut slot = self.subscription.lock().await;
        if let Some(active) = slot.take() {
            tracing::debug!("Restarting realtime sync; stopping previous subscription");
            active.shutdown();
        }

        self.shared.set_state(SyncState::Connecting);
        let subscription = match self.remote.subscribe_by_owner(owner).await {
            Ok(subscription) => subscription,
            Err(error) => {
                self.shared.record_error(&error);
                return Err(error);
            }
        };

        let canceller = subscription.canceller();
        let driver = tokio::spawn(drive_subscription(subscription, Arc::clone(&self.shared)));
        *slot = Some(ActiveSubscription { canceller, driver });
        tracing::debug!(owner = %owner, "Realtime sync started");
        Ok(())
    }

    /// Cancel the live subscription and return to `Idle`; a no-op when
    /// nothing is active
    pub async fn stop_realtime_sync(&self) {
        let mut slot = self.subscription.lock().await;
        if let Some(active) = slot.take() {
            active.shutdown();
            self.shared.set_state(SyncState::Idle);
            tracing::debug!("Realtime sync stopped");
        }
    }

    /// One-shot, non-subscribing fetch and reconcile.
    ///
    /// Fails fast when connectivity is down and bounds the fetch with the
    /// configured timeout; blocking indefinitely on a lost connection is a
    /// bug, not acceptable behavior.
    pub async fn force_sync_now(&self, owner: &OwnerId) -> Result<ConflictResolutionResult> {
        self.ensure_session_owner(owner)?;
        if !self.connectivity.currently_online() {
            return Err(Error::Offline(
                "force sync requires connectivity".to_string(),
            ));
        }

        self.shared
            .publish_status_guarded(|status| status.state = SyncState::Syncing);
        let fetched = timeout(self.options.fetch_timeout, self.remote.query_by_owner(owner)).await;
        let documents = match fetched {
            Ok(Ok(documents)) => documents,
            Ok(Err(error)) => {
                self.shared.record_error(&error);
                return Err(error);
            }
            Err(_) => {
                let error = Error::Timeout(self.options.fetch_timeout);
                self.shared.record_error(&error);
                return Err(error);
            }
        };

        let tasks = map_documents(documents);
        let synced = tasks.len();
        match self.shared.apply_remote_snapshot(&tasks).await {
            Ok(result) => {
                self.shared.remote_snapshot.send_replace(tasks);
                self.shared.publish_status_guarded(|status| {
                    status.synced_count = synced;
                    status.last_error = None;
                    status.pending_conflict_count = result.pending_conflicts;
                    status.state = if result.pending_conflicts == 0 {
                        SyncState::Synced
                    } else {
                        SyncState::Error
                    };
                });
                Ok(result)
            }
            Err(error) => {
                self.shared.record_error(&error);
                Err(error)
            }
        }
    }

    /// Reconcile two snapshots and map the outcome onto the sync state:
    /// `Synced` when clean, `Error` while conflicts pend (degraded but
    /// recoverable; the merged list stays usable)
    pub fn sync_tasks_with_conflict_resolution(
        &self,
        local_tasks: &[Task],
        remote_tasks: &[Task],
    ) -> ConflictResolutionResult {
        let outcome = self
            .shared
            .resolver
            .resolve_task_conflicts(local_tasks, remote_tasks);
        let pending = self.shared.resolver.pending_count();
        self.shared.publish_status_guarded(|status| {
            status.pending_conflict_count = pending;
            status.state = if pending == 0 {
                SyncState::Synced
            } else {
                SyncState::Error
            };
        });
        ConflictResolutionResult {
            resolved: outcome.resolved,
            new_conflicts: outcome.conflicts,
            pending_conflicts: pending,
        }
    }

    /// Apply a manual strategy to a pending conflict and persist the
    /// survivor locally. Returns `false` when the conflict id is unknown.
    pub async fn resolve_conflict_manually(
        &self,
        conflict_id: ConflictId,
        strategy: ResolutionStrategy,
        merged_task: Option<Task>,
    ) -> Result<bool> {
        let Some(survivor) =
            self.shared
                .resolver
                .apply_strategy(conflict_id, strategy, merged_task)
        else {
            return Ok(false);
        };
        self.shared
            .write_back(std::slice::from_ref(&survivor))
            .await?;
        let pending = self.shared.resolver.pending_count();
        self.shared.publish_status_guarded(|status| {
            status.pending_conflict_count = pending;
            if pending == 0 && status.state == SyncState::Error && status.last_error.is_none() {
                status.state = SyncState::Synced;
            }
        });
        Ok(true)
    }

    /// Snapshot of the pending conflicts
    #[must_use]
    pub fn pending_conflicts(&self) -> Vec<SyncConflict> {
        self.shared.resolver.pending_conflicts()
    }

    /// Prune pending conflicts past the retention window
    pub fn clean_old_conflicts(&self) {
        self.shared.resolver.clean_old_conflicts();
        let pending = self.shared.resolver.pending_count();
        self.shared
            .publish_status_guarded(|status| status.pending_conflict_count = pending);
    }

    /// Sync status stream, independent of task data
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    /// Current status snapshot
    #[must_use]
    pub fn current_status(&self) -> SyncStatus {
        self.shared.status.borrow().clone()
    }

    /// Latest published remote snapshot
    #[must_use]
    pub fn watch_remote(&self) -> watch::Receiver<Vec<Task>> {
        self.shared.remote_snapshot.subscribe()
    }

    /// Merged, ordered task list stream
    #[must_use]
    pub fn watch_tasks(&self) -> watch::Receiver<Vec<Task>> {
        self.merged.subscribe()
    }

    fn ensure_session_owner(&self, owner: &OwnerId) -> Result<()> {
        if *owner == self.shared.session_owner {
            Ok(())
        } else {
            Err(Error::OwnerMismatch {
                requested: owner.to_string(),
                session: self.shared.session_owner.to_string(),
            })
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.watcher.abort();
        self.feed.abort();
        if let Ok(mut slot) = self.subscription.try_lock() {
            if let Some(active) = slot.take() {
                active.shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualConnectivity, MemoryLocalStore, MemoryRemoteStore};
    use crate::models::TaskId;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        local: Arc<MemoryLocalStore>,
        remote: Arc<MemoryRemoteStore>,
        connectivity: Arc<ManualConnectivity>,
        coordinator: SyncCoordinator,
    }

    fn owner() -> OwnerId {
        OwnerId::new("alice")
    }

    fn fixture() -> Fixture {
        fixture_with_connectivity(true)
    }

    fn fixture_with_connectivity(online: bool) -> Fixture {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let connectivity = Arc::new(ManualConnectivity::new(online));
        let coordinator = SyncCoordinator::new(
            local.clone(),
            remote.clone(),
            connectivity.clone(),
            Arc::new(ConflictResolver::default()),
            owner(),
            SyncOptions::default().with_fetch_timeout(Duration::from_secs(1)),
        );
        Fixture {
            local,
            remote,
            connectivity,
            coordinator,
        }
    }

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
            owner_id: owner(),
        }
    }

    async fn wait_for_state(status: &mut watch::Receiver<SyncStatus>, target: SyncState) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while status.borrow().state != target {
                status.changed().await.expect("status channel closed");
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "timed out waiting for {target}, last state {}",
                status.borrow().state
            )
        });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_live_snapshot_reaches_local_store_and_feed() {
        let fixture = fixture();
        let mut status = fixture.coordinator.watch_status();
        let mut tasks_feed = fixture.coordinator.watch_tasks();

        fixture
            .remote
            .put(task(1, "Remote task", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        fixture
            .coordinator
            .start_realtime_sync(&owner())
            .await
            .unwrap();
        wait_for_state(&mut status, SyncState::Synced).await;

        let mirrored = fixture.local.get_by_id(TaskId::new(1)).await.unwrap();
        assert_eq!(mirrored.unwrap().title, "Remote task");
        assert_eq!(status.borrow().synced_count, 1);
        assert!(status.borrow().last_error.is_none());

        tokio::time::timeout(Duration::from_secs(2), async {
            while tasks_feed.borrow().is_empty() {
                tasks_feed.changed().await.unwrap();
            }
        })
        .await
        .expect("merged feed never published");
        assert_eq!(tasks_feed.borrow()[0].id, TaskId::new(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restart_leaves_exactly_one_subscription() {
        let fixture = fixture();
        fixture
            .coordinator
            .start_realtime_sync(&owner())
            .await
            .unwrap();
        fixture
            .coordinator
            .start_realtime_sync(&owner())
            .await
            .unwrap();

        assert_eq!(fixture.remote.subscribe_count(), 2);
        assert_eq!(fixture.remote.active_subscriptions(), 1);

        fixture.coordinator.stop_realtime_sync().await;
        assert_eq!(fixture.remote.active_subscriptions(), 0);
        assert_eq!(fixture.coordinator.current_status().state, SyncState::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_is_safe_without_subscription() {
        let fixture = fixture();
        fixture.coordinator.stop_realtime_sync().await;
        assert_eq!(fixture.coordinator.current_status().state, SyncState::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_malformed_rows_are_dropped_not_fatal() {
        let fixture = fixture();
        let mut status = fixture.coordinator.watch_status();

        fixture
            .remote
            .push_document(&owner(), json!({"id": "broken", "title": 5}));
        fixture
            .remote
            .put(task(2, "Good row", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        fixture
            .coordinator
            .start_realtime_sync(&owner())
            .await
            .unwrap();
        wait_for_state(&mut status, SyncState::Synced).await;

        assert_eq!(status.borrow().synced_count, 1);
        assert!(status.borrow().last_error.is_none());
        assert!(fixture
            .local
            .get_by_id(TaskId::new(2))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transport_error_publishes_empty_snapshot_and_clears_later() {
        let fixture = fixture();
        let mut status = fixture.coordinator.watch_status();
        let remote_feed = fixture.coordinator.watch_remote();

        fixture
            .remote
            .put(task(1, "Remote task", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        fixture
            .coordinator
            .start_realtime_sync(&owner())
            .await
            .unwrap();
        wait_for_state(&mut status, SyncState::Synced).await;

        fixture.remote.emit_transport_error(&owner(), "boom");
        wait_for_state(&mut status, SyncState::Error).await;
        assert_eq!(status.borrow().last_error.as_deref(), Some("boom"));
        assert!(remote_feed.borrow().is_empty());

        // A subsequent successful sync clears the error.
        fixture
            .remote
            .put(task(3, "Recovery", "2024-02-01T00:00:00Z"))
            .await
            .unwrap();
        wait_for_state(&mut status, SyncState::Synced).await;
        assert!(status.borrow().last_error.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_overrides_and_regain_stays_idle() {
        let fixture = fixture();
        let mut status = fixture.coordinator.watch_status();

        fixture
            .coordinator
            .start_realtime_sync(&owner())
            .await
            .unwrap();
        wait_for_state(&mut status, SyncState::Synced).await;

        fixture.connectivity.set_online(false);
        wait_for_state(&mut status, SyncState::Offline).await;
        assert_eq!(fixture.remote.active_subscriptions(), 0);

        // An in-flight remote update must not flip the state back.
        fixture
            .remote
            .put(task(5, "Ignored while offline", "2024-03-01T00:00:00Z"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fixture.coordinator.current_status().state, SyncState::Offline);
        assert!(fixture
            .local
            .get_by_id(TaskId::new(5))
            .await
            .unwrap()
            .is_none());

        // Regaining the network moves Offline -> Idle without restarting.
        let calls_before = fixture.remote.subscribe_count();
        fixture.connectivity.set_online(true);
        wait_for_state(&mut status, SyncState::Idle).await;
        assert_eq!(fixture.remote.subscribe_count(), calls_before);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_force_sync_fails_fast_when_offline() {
        let fixture = fixture_with_connectivity(false);
        let error = fixture
            .coordinator
            .force_sync_now(&owner())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Offline(_)));
        assert_eq!(fixture.remote.subscribe_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_force_sync_applies_resolution() {
        let fixture = fixture();
        fixture
            .remote
            .put(task(1, "Fetched", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();

        let result = fixture.coordinator.force_sync_now(&owner()).await.unwrap();
        assert_eq!(result.resolved.len(), 1);
        assert_eq!(result.pending_conflicts, 0);
        assert_eq!(fixture.coordinator.current_status().state, SyncState::Synced);
        assert!(fixture
            .local
            .get_by_id(TaskId::new(1))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_force_sync_surfaces_transport_failure() {
        let fixture = fixture();
        fixture.remote.fail_next_query();

        let error = fixture
            .coordinator
            .force_sync_now(&owner())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Transport(_)));
        assert_eq!(fixture.coordinator.current_status().state, SyncState::Error);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_surfaces_as_error_until_resolved() {
        let fixture = fixture();
        let mut status = fixture.coordinator.watch_status();

        fixture
            .local
            .insert(task(1, "Draft", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        fixture
            .remote
            .put(task(1, "Final", "2024-01-02T00:00:00Z"))
            .await
            .unwrap();
        fixture
            .coordinator
            .start_realtime_sync(&owner())
            .await
            .unwrap();
        wait_for_state(&mut status, SyncState::Error).await;
        assert_eq!(status.borrow().pending_conflict_count, 1);

        // The automatic pick (newer remote copy) keeps the list usable.
        let mirrored = fixture.local.get_by_id(TaskId::new(1)).await.unwrap();
        assert_eq!(mirrored.unwrap().title, "Final");

        let conflict = &fixture.coordinator.pending_conflicts()[0];
        let resolved = fixture
            .coordinator
            .resolve_conflict_manually(conflict.id, ResolutionStrategy::PreferLocal, None)
            .await
            .unwrap();
        assert!(resolved);
        wait_for_state(&mut status, SyncState::Synced).await;
        assert_eq!(status.borrow().pending_conflict_count, 0);

        let restored = fixture.local.get_by_id(TaskId::new(1)).await.unwrap();
        assert_eq!(restored.unwrap().title, "Draft");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_unknown_conflict_returns_false() {
        let fixture = fixture();
        let resolved = fixture
            .coordinator
            .resolve_conflict_manually(ConflictId::new(), ResolutionStrategy::PreferLocal, None)
            .await
            .unwrap();
        assert!(!resolved);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_owner_mismatch_is_rejected() {
        let fixture = fixture();
        let error = fixture
            .coordinator
            .start_realtime_sync(&OwnerId::new("mallory"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::OwnerMismatch { .. }));
        assert_eq!(fixture.remote.subscribe_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_tasks_with_conflict_resolution_maps_state() {
        let fixture = fixture();
        let local_tasks = vec![task(1, "Draft", "2024-01-01T00:00:00Z")];
        let remote_tasks = vec![task(1, "Final", "2024-01-02T00:00:00Z")];

        let result = fixture
            .coordinator
            .sync_tasks_with_conflict_resolution(&local_tasks, &remote_tasks);
        assert_eq!(result.pending_conflicts, 1);
        assert_eq!(fixture.coordinator.current_status().state, SyncState::Error);

        let clean = fixture
            .coordinator
            .sync_tasks_with_conflict_resolution(&remote_tasks, &remote_tasks);
        assert_eq!(clean.new_conflicts.len(), 0);
    }
}
