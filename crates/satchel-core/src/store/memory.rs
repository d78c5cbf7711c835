//! In-memory store implementations
//!
//! Back the CLI harness and the test suite. The remote store is
//! programmable: raw document injection, scripted failures, and call
//! counters for subscription-lifecycle assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::{
    ConnectivityMonitor, Document, LocalStore, RemoteEvent, RemoteStore, RemoteSubscription,
};
use crate::error::{Error, Result};
use crate::models::{OwnerId, Task, TaskId};

const SUBSCRIPTION_BUFFER: usize = 16;

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Local store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LocalInner {
    next_id: i64,
    tasks: HashMap<TaskId, Task>,
    feeds: HashMap<OwnerId, watch::Sender<Vec<Task>>>,
}

impl LocalInner {
    fn snapshot(&self, owner: &OwnerId) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|task| task.owner_id == *owner)
            .cloned()
            .collect();
        tasks.sort_by_key(|task| task.id);
        tasks
    }

    fn publish(&self, owner: &OwnerId) {
        if let Some(feed) = self.feeds.get(owner) {
            feed.send_replace(self.snapshot(owner));
        }
    }
}

/// In-memory [`LocalStore`] publishing owner feeds over watch channels
pub struct MemoryLocalStore {
    inner: Mutex<LocalInner>,
}

impl MemoryLocalStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LocalInner {
                next_id: 1,
                ..LocalInner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LocalInner> {
        lock_ignoring_poison(&self.inner)
    }
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn insert(&self, mut task: Task) -> Result<TaskId> {
        let mut inner = self.lock();
        if task.id.is_unassigned() {
            task.id = TaskId::new(inner.next_id);
            inner.next_id += 1;
        } else {
            if inner.tasks.contains_key(&task.id) {
                return Err(Error::InvalidInput(format!(
                    "task id {} already exists",
                    task.id
                )));
            }
            // Keep locally assigned ids clear of mirrored remote ids.
            inner.next_id = inner.next_id.max(task.id.as_i64() + 1);
        }
        let id = task.id;
        let owner = task.owner_id.clone();
        inner.tasks.insert(id, task);
        inner.publish(&owner);
        Ok(id)
    }

    async fn update(&self, task: Task) -> Result<()> {
        let mut inner = self.lock();
        if !inner.tasks.contains_key(&task.id) {
            return Err(Error::NotFound(task.id.to_string()));
        }
        let owner = task.owner_id.clone();
        inner.tasks.insert(task.id, task);
        inner.publish(&owner);
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        let mut inner = self.lock();
        let Some(task) = inner.tasks.remove(&id) else {
            return Err(Error::NotFound(id.to_string()));
        };
        inner.publish(&task.owner_id);
        Ok(())
    }

    async fn get_by_id(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.lock().tasks.get(&id).cloned())
    }

    async fn get_by_external_source_id(&self, external_id: &str) -> Result<Option<Task>> {
        let inner = self.lock();
        Ok(inner
            .tasks
            .values()
            .find(|task| task.external_source_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Task>> {
        Ok(self.lock().snapshot(owner))
    }

    fn watch_by_owner(&self, owner: &OwnerId) -> watch::Receiver<Vec<Task>> {
        let mut inner = self.lock();
        let snapshot = inner.snapshot(owner);
        inner
            .feeds
            .entry(owner.clone())
            .or_insert_with(|| watch::channel(snapshot).0)
            .subscribe()
    }
}

// ---------------------------------------------------------------------------
// Remote store
// ---------------------------------------------------------------------------

struct Subscriber {
    owner: OwnerId,
    sender: mpsc::Sender<RemoteEvent>,
}

type SubscriberMap = Arc<Mutex<HashMap<u64, Subscriber>>>;

/// In-memory [`RemoteStore`] with programmable behavior for tests and the
/// CLI simulation: raw document injection, scripted failures, and counters
/// over the subscription lifecycle.
pub struct MemoryRemoteStore {
    rows: Mutex<HashMap<OwnerId, Vec<Document>>>,
    subscribers: SubscriberMap,
    next_subscriber: AtomicU64,
    subscribe_calls: AtomicUsize,
    fail_next_query: AtomicBool,
    fail_next_subscribe: AtomicBool,
}

impl MemoryRemoteStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber: AtomicU64::new(1),
            subscribe_calls: AtomicUsize::new(0),
            fail_next_query: AtomicBool::new(false),
            fail_next_subscribe: AtomicBool::new(false),
        }
    }

    /// Number of `subscribe_by_owner` calls made so far
    #[must_use]
    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Number of currently registered live listeners
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        lock_ignoring_poison(&self.subscribers).len()
    }

    /// Make the next one-shot query fail with a transport error
    pub fn fail_next_query(&self) {
        self.fail_next_query.store(true, Ordering::SeqCst);
    }

    /// Make the next subscribe call fail with a transport error
    pub fn fail_next_subscribe(&self) {
        self.fail_next_subscribe.store(true, Ordering::SeqCst);
    }

    /// Inject a raw row document and notify listeners; used to simulate
    /// malformed rows arriving from the wire
    pub fn push_document(&self, owner: &OwnerId, document: Document) {
        lock_ignoring_poison(&self.rows)
            .entry(owner.clone())
            .or_default()
            .push(document);
        self.notify(owner);
    }

    /// Emit a transport error to the owner's live listeners
    pub fn emit_transport_error(&self, owner: &OwnerId, message: impl Into<String>) {
        let message = message.into();
        self.broadcast(owner, RemoteEvent::TransportError(message));
    }

    fn snapshot(&self, owner: &OwnerId) -> Vec<Document> {
        let rows = lock_ignoring_poison(&self.rows);
        let mut documents = rows.get(owner).cloned().unwrap_or_default();
        // Live queries are ordered by created_at descending.
        documents.sort_by(|a, b| created_at_of(b).cmp(created_at_of(a)));
        documents
    }

    fn notify(&self, owner: &OwnerId) {
        let snapshot = self.snapshot(owner);
        self.broadcast(owner, RemoteEvent::Snapshot(snapshot));
    }

    fn broadcast(&self, owner: &OwnerId, event: RemoteEvent) {
        let mut subscribers = lock_ignoring_poison(&self.subscribers);
        let mut stale = Vec::new();
        for (key, subscriber) in subscribers.iter() {
            if subscriber.owner != *owner {
                continue;
            }
            if subscriber.sender.try_send(event.clone()).is_err() {
                stale.push(*key);
            }
        }
        for key in stale {
            subscribers.remove(&key);
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn created_at_of(document: &Document) -> &str {
    document
        .get("created_at")
        .and_then(Document::as_str)
        .unwrap_or_default()
}

fn id_of(document: &Document) -> Option<i64> {
    document.get("id").and_then(Document::as_i64)
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn put(&self, task: Task) -> Result<()> {
        let document = task.to_document()?;
        let owner = task.owner_id.clone();
        {
            let mut rows = lock_ignoring_poison(&self.rows);
            let documents = rows.entry(owner.clone()).or_default();
            match documents
                .iter_mut()
                .find(|existing| id_of(existing) == Some(task.id.as_i64()))
            {
                Some(existing) => *existing = document,
                None => documents.push(document),
            }
        }
        self.notify(&owner);
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        let owner = {
            let mut rows = lock_ignoring_poison(&self.rows);
            let mut touched = None;
            for (owner, documents) in rows.iter_mut() {
                let before = documents.len();
                documents.retain(|document| id_of(document) != Some(id.as_i64()));
                if documents.len() != before {
                    touched = Some(owner.clone());
                    break;
                }
            }
            touched
        };
        match owner {
            Some(owner) => {
                self.notify(&owner);
                Ok(())
            }
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    async fn query_by_owner(&self, owner: &OwnerId) -> Result<Vec<Document>> {
        if self.fail_next_query.swap(false, Ordering::SeqCst) {
            return Err(Error::Transport("scripted fetch failure".to_string()));
        }
        Ok(self.snapshot(owner))
    }

    async fn subscribe_by_owner(&self, owner: &OwnerId) -> Result<RemoteSubscription> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_subscribe.swap(false, Ordering::SeqCst) {
            return Err(Error::Transport("scripted subscribe failure".to_string()));
        }

        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let key = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        // Deliver the current result set before any change event.
        let _ = sender.try_send(RemoteEvent::Snapshot(self.snapshot(owner)));
        lock_ignoring_poison(&self.subscribers).insert(
            key,
            Subscriber {
                owner: owner.clone(),
                sender,
            },
        );

        let subscribers = Arc::clone(&self.subscribers);
        Ok(RemoteSubscription::new(receiver, move || {
            lock_ignoring_poison(&subscribers).remove(&key);
        }))
    }
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

/// Hand-toggled [`ConnectivityMonitor`] for tests and the CLI simulation
pub struct ManualConnectivity {
    sender: watch::Sender<bool>,
}

impl ManualConnectivity {
    /// Create a monitor reporting the given initial reachability
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    /// Flip the reported reachability
    pub fn set_online(&self, online: bool) {
        self.sender.send_replace(online);
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn currently_online(&self) -> bool {
        *self.sender.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}
