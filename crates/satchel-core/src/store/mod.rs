//! Store boundaries
//!
//! The local cache, the remote durable store, and the connectivity signal
//! are external collaborators. This module specifies them as traits; the
//! sync core consumes them as `Arc<dyn …>` and assumes no physical encoding
//! beyond the row documents the remote store emits.

mod memory;

pub use memory::{ManualConnectivity, MemoryLocalStore, MemoryRemoteStore};

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::Result;
use crate::models::{OwnerId, Task, TaskId};

/// Raw remote row; mapping to [`Task`] is per-row and fallible
pub type Document = serde_json::Value;

/// One event from a live remote query
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// Full snapshot of the subscribed result set
    Snapshot(Vec<Document>),
    /// Transport failure; the subscription stays registered and may emit
    /// further events
    TransportError(String),
}

/// Shareable cancel handle for a [`RemoteSubscription`].
///
/// Cancelling unregisters the listener synchronously; it is idempotent and
/// safe to call from any task.
#[derive(Clone)]
pub struct SubscriptionCanceller {
    hook: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl SubscriptionCanceller {
    fn new(hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            hook: Arc::new(Mutex::new(Some(Box::new(hook)))),
        }
    }

    /// Unregister the listener; no further event is produced once this
    /// returns
    pub fn cancel(&self) {
        let hook = self
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl fmt::Debug for SubscriptionCanceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionCanceller").finish_non_exhaustive()
    }
}

/// Cancellable handle for a live remote query.
///
/// Events arrive over a bounded channel. Dropping the handle cancels it; an
/// explicit [`SubscriptionCanceller`] allows cancelling from outside the
/// task that consumes events.
pub struct RemoteSubscription {
    events: mpsc::Receiver<RemoteEvent>,
    canceller: SubscriptionCanceller,
}

impl RemoteSubscription {
    /// Build a subscription from an event channel and an unsubscribe hook
    #[must_use]
    pub fn new(
        events: mpsc::Receiver<RemoteEvent>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            canceller: SubscriptionCanceller::new(unsubscribe),
        }
    }

    /// Shareable cancel handle
    #[must_use]
    pub fn canceller(&self) -> SubscriptionCanceller {
        self.canceller.clone()
    }

    /// Receive the next event; `None` once the feed has closed
    pub async fn next_event(&mut self) -> Option<RemoteEvent> {
        self.events.recv().await
    }
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        self.canceller.cancel();
    }
}

impl fmt::Debug for RemoteSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSubscription").finish_non_exhaustive()
    }
}

/// Durable local cache of task records; the single write path the rest of
/// the application observes
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert a task. An unassigned id is replaced with a locally assigned
    /// one; a concrete id is preserved (mirroring a remote record must keep
    /// its identity). Returns the stored id.
    async fn insert(&self, task: Task) -> Result<TaskId>;

    /// Update an existing task
    async fn update(&self, task: Task) -> Result<()>;

    /// Delete a task
    async fn delete(&self, id: TaskId) -> Result<()>;

    /// Fetch a task by id
    async fn get_by_id(&self, id: TaskId) -> Result<Option<Task>>;

    /// Fetch a task by its import-origin identifier
    async fn get_by_external_source_id(&self, external_id: &str) -> Result<Option<Task>>;

    /// List all tasks for an owner
    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Task>>;

    /// Live feed of an owner's tasks
    fn watch_by_owner(&self, owner: &OwnerId) -> watch::Receiver<Vec<Task>>;
}

/// Remote durable store; authoritative when reachable
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Write a task record
    async fn put(&self, task: Task) -> Result<()>;

    /// Delete a task record
    async fn delete(&self, id: TaskId) -> Result<()>;

    /// One-shot fetch of an owner's rows
    async fn query_by_owner(&self, owner: &OwnerId) -> Result<Vec<Document>>;

    /// Open a live query over an owner's rows, ordered by `created_at`
    /// descending
    async fn subscribe_by_owner(&self, owner: &OwnerId) -> Result<RemoteSubscription>;
}

/// Network reachability signal
pub trait ConnectivityMonitor: Send + Sync {
    /// Current reachability
    fn currently_online(&self) -> bool;

    /// Reachability change feed
    fn watch(&self) -> watch::Receiver<bool>;
}
