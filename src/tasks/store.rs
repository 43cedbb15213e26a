//! In-memory task cache with write-behind durable snapshots.
//!
//! The cache is authoritative. Every mutation enqueues a full snapshot on a
//! bounded channel drained by a single writer task, so durable writes apply
//! in mutation order. A crash loses at most the writes still queued.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};
use uuid::Uuid;

use crate::store::SnapshotStore;
use crate::tasks::model::Task;

/// A queued durable write.
enum WriteOp {
    Save(Box<Task>),
    Delete(Uuid),
    Flush(oneshot::Sender<()>),
}

/// Task records keyed by id.
pub struct TaskStore {
    cache: RwLock<HashMap<Uuid, Task>>,
    durable: Option<Arc<dyn SnapshotStore>>,
    writes: Option<mpsc::Sender<WriteOp>>,
}

impl TaskStore {
    /// Create a store backed by `durable`, with a write queue of `capacity` entries.
    ///
    /// Spawns the writer task, so this must be called inside a Tokio runtime.
    pub fn new(durable: Arc<dyn SnapshotStore>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_writer(Arc::clone(&durable), rx));
        Self {
            cache: RwLock::new(HashMap::new()),
            durable: Some(durable),
            writes: Some(tx),
        }
    }

    /// A cache-only store with no durable backing.
    pub fn in_memory() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            durable: None,
            writes: None,
        }
    }

    /// Insert or replace a task.
    pub async fn put(&self, task: Task) {
        let mut cache = self.cache.write().await;
        let snapshot = Box::new(task.clone());
        cache.insert(task.id, task);
        // Enqueued under the lock so queue order matches mutation order.
        self.enqueue(WriteOp::Save(snapshot)).await;
    }

    /// Look up a task, falling back to durable storage on a cache miss.
    pub async fn get(&self, id: Uuid) -> Option<Task> {
        if let Some(task) = self.cache.read().await.get(&id) {
            return Some(task.clone());
        }

        let durable = self.durable.as_ref()?;
        match durable.load_task(id).await {
            Ok(Some(task)) => {
                tracing::debug!(task_id = %id, "Task loaded from durable storage");
                let mut cache = self.cache.write().await;
                // A concurrent put may have won the race; keep the newer record.
                Some(cache.entry(id).or_insert(task).clone())
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "Failed to load task snapshot");
                None
            }
        }
    }

    /// Mutate a task in place. The snapshot is written only when `f` returns `Ok`.
    ///
    /// Returns `None` if the task does not exist.
    pub async fn update<F, T, E>(&self, id: Uuid, f: F) -> Option<Result<T, E>>
    where
        F: FnOnce(&mut Task) -> Result<T, E>,
    {
        if !self.cache.read().await.contains_key(&id) {
            // Populate from durable storage after a restart.
            self.get(id).await?;
        }

        let mut cache = self.cache.write().await;
        let task = cache.get_mut(&id)?;
        let outcome = f(task);
        if outcome.is_ok() {
            let snapshot = Box::new(task.clone());
            self.enqueue(WriteOp::Save(snapshot)).await;
        }
        Some(outcome)
    }

    /// Remove a task. Returns the removed record, if any.
    pub async fn delete(&self, id: Uuid) -> Option<Task> {
        let mut cache = self.cache.write().await;
        let removed = cache.remove(&id);
        self.enqueue(WriteOp::Delete(id)).await;
        removed
    }

    /// All cached tasks matching `predicate`.
    pub async fn list<P>(&self, predicate: P) -> Vec<Task>
    where
        P: Fn(&Task) -> bool,
    {
        self.cache
            .read()
            .await
            .values()
            .filter(|t| predicate(t))
            .cloned()
            .collect()
    }

    /// Number of cached tasks.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Load every durable snapshot into the cache. Returns the number loaded.
    ///
    /// Cached records win over durable ones with the same id.
    pub async fn load_all(&self) -> usize {
        let Some(durable) = &self.durable else {
            return 0;
        };
        let tasks = match durable.load_all_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load task snapshots");
                return 0;
            }
        };

        let mut cache = self.cache.write().await;
        let mut loaded = 0;
        for task in tasks {
            if let std::collections::hash_map::Entry::Vacant(slot) = cache.entry(task.id) {
                slot.insert(task);
                loaded += 1;
            }
        }
        loaded
    }

    /// Wait until every write enqueued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.enqueue(WriteOp::Flush(done_tx)).await;
        if self.writes.is_some() {
            let _ = done_rx.await;
        }
    }

    async fn enqueue(&self, op: WriteOp) {
        let Some(tx) = &self.writes else {
            return;
        };
        if tx.send(op).await.is_err() {
            tracing::warn!("Snapshot writer stopped, durable write dropped");
        }
    }
}

/// Drain the write queue in order. Failures are logged, never retried.
async fn run_writer(durable: Arc<dyn SnapshotStore>, mut rx: mpsc::Receiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Save(task) => {
                if let Err(e) = durable.save_task(&task).await {
                    tracing::warn!(task_id = %task.id, error = %e, "Failed to persist task snapshot");
                }
            }
            WriteOp::Delete(id) => {
                if let Err(e) = durable.delete_task(id).await {
                    tracing::warn!(task_id = %id, error = %e, "Failed to delete task snapshot");
                }
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Snapshot writer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;
    use crate::store::LibSqlBackend;
    use crate::tasks::model::{GenerationMode, TaskParams, TaskUpdate};
    use crate::tasks::state::TaskStatus;
    use async_trait::async_trait;

    fn make_task(user: &str) -> Task {
        Task::new(
            TaskParams::new(GenerationMode::Transform, user, vec!["a.jpg".into()]),
            2,
        )
    }

    /// Durable store whose every call fails.
    struct BrokenStore;

    #[async_trait]
    impl SnapshotStore for BrokenStore {
        async fn save_task(&self, _task: &Task) -> Result<(), DatabaseError> {
            Err(DatabaseError::Query("disk full".into()))
        }
        async fn load_task(&self, _id: Uuid) -> Result<Option<Task>, DatabaseError> {
            Err(DatabaseError::Query("disk full".into()))
        }
        async fn delete_task(&self, _id: Uuid) -> Result<(), DatabaseError> {
            Err(DatabaseError::Query("disk full".into()))
        }
        async fn load_all_tasks(&self) -> Result<Vec<Task>, DatabaseError> {
            Err(DatabaseError::Query("disk full".into()))
        }
    }

    #[tokio::test]
    async fn put_get_delete_in_memory() {
        let store = TaskStore::in_memory();
        let task = make_task("u1");
        let id = task.id;

        store.put(task).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(id).await.unwrap().id, id);

        assert!(store.delete(id).await.is_some());
        assert!(store.get(id).await.is_none());
        assert!(store.is_empty().await);
        store.flush().await;
    }

    #[tokio::test]
    async fn flush_makes_writes_durable() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let store = TaskStore::new(backend.clone(), 8);
        let task = make_task("u1");
        let id = task.id;

        store.put(task).await;
        store.flush().await;

        let durable = backend.load_task(id).await.unwrap().unwrap();
        assert_eq!(durable.id, id);
    }

    #[tokio::test]
    async fn cache_miss_falls_back_to_durable() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let task = make_task("u1");
        let id = task.id;
        backend.save_task(&task).await.unwrap();

        let store = TaskStore::new(backend, 8);
        assert!(store.is_empty().await);
        let loaded = store.get(id).await.unwrap();
        assert_eq!(loaded, task);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_persists_only_on_success() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let store = TaskStore::new(backend.clone(), 8);
        let task = make_task("u1");
        let id = task.id;
        store.put(task).await;

        let ok: Option<Result<(), ()>> = store
            .update(id, |t| {
                t.apply(TaskUpdate::new().status(TaskStatus::Processing));
                Ok(())
            })
            .await;
        assert!(matches!(ok, Some(Ok(()))));

        let rejected: Option<Result<(), &str>> = store.update(id, |_| Err("nope")).await;
        assert!(matches!(rejected, Some(Err("nope"))));

        let missing: Option<Result<(), ()>> = store.update(Uuid::new_v4(), |_| Ok(())).await;
        assert!(missing.is_none());

        store.flush().await;
        let durable = backend.load_task(id).await.unwrap().unwrap();
        assert_eq!(durable.status, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn durable_failure_never_rolls_back_cache() {
        let store = TaskStore::new(Arc::new(BrokenStore), 4);
        let task = make_task("u1");
        let id = task.id;

        store.put(task).await;
        store.flush().await;
        assert!(store.get(id).await.is_some());
        assert_eq!(store.load_all().await, 0);
    }

    #[tokio::test]
    async fn list_filters_by_predicate() {
        let store = TaskStore::in_memory();
        store.put(make_task("alice")).await;
        store.put(make_task("alice")).await;
        store.put(make_task("bob")).await;

        let alice = store.list(|t| t.meta.user_id == "alice").await;
        assert_eq!(alice.len(), 2);
        assert_eq!(store.list(|_| true).await.len(), 3);
    }

    #[tokio::test]
    async fn load_all_repopulates_cache() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        for user in ["a", "b", "c"] {
            backend.save_task(&make_task(user)).await.unwrap();
        }

        let store = TaskStore::new(backend, 8);
        assert_eq!(store.load_all().await, 3);
        assert_eq!(store.len().await, 3);
        // Already cached, nothing new to load
        assert_eq!(store.load_all().await, 0);
    }
}
