//! Task queue service: creation, updates, listing and expiry on top of `TaskStore`.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::TaskError;
use crate::tasks::model::{Task, TaskParams, TaskUpdate};
use crate::tasks::state::TaskStatus;
use crate::tasks::store::TaskStore;

/// Per-status task counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub timeout: usize,
    pub cancelled: usize,
}

/// Owns the task store. Constructed once per process and shared by `Arc`.
pub struct TaskQueueService {
    store: TaskStore,
    config: QueueConfig,
}

impl TaskQueueService {
    pub fn new(store: TaskStore, config: QueueConfig) -> Self {
        Self { store, config }
    }

    /// A service with no durable backing.
    pub fn in_memory(config: QueueConfig) -> Self {
        Self::new(TaskStore::in_memory(), config)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Create and persist a pending task. Execution is scheduled by the caller.
    pub async fn create_task(&self, params: TaskParams) -> Task {
        let task = Task::new(params, self.config.max_retries);
        tracing::info!(
            task_id = %task.id,
            mode = %task.meta.mode,
            user_id = %task.meta.user_id,
            images = task.meta.image_count,
            "Task created"
        );
        self.store.put(task.clone()).await;
        task
    }

    /// Merge `update` into a task.
    ///
    /// Returns `Ok(None)` for an unknown id. A status change must follow the
    /// transition table; `completed_at` is kept in step with terminal status.
    pub async fn update_task(
        &self,
        id: Uuid,
        update: TaskUpdate,
    ) -> Result<Option<Task>, TaskError> {
        let outcome = self
            .store
            .update(id, |task| {
                let mut update = update;
                if let Some(target) = update.status {
                    if target != task.status && !task.status.can_transition_to(target) {
                        return Err(TaskError::InvalidTransition {
                            id,
                            state: task.status.to_string(),
                            target: target.to_string(),
                        });
                    }
                    if target.is_terminal() {
                        if update.completed_at.is_none() && task.completed_at.is_none() {
                            update.completed_at = Some(Some(Utc::now()));
                        }
                    } else {
                        update.completed_at = Some(None);
                    }
                }

                let previous = (task.status, task.progress);
                task.apply(update);
                if previous != (task.status, task.progress) {
                    tracing::debug!(
                        task_id = %id,
                        status = %task.status,
                        progress = task.progress,
                        "Task updated"
                    );
                }
                Ok(task.clone())
            })
            .await;

        match outcome {
            Some(result) => result.map(Some),
            None => {
                tracing::warn!(task_id = %id, "Update for unknown task ignored");
                Ok(None)
            }
        }
    }

    /// Cache-first lookup with durable fallback.
    pub async fn get_task(&self, id: Uuid) -> Option<Task> {
        self.store.get(id).await
    }

    /// A user's tasks, newest first.
    pub async fn list_tasks_by_user(&self, user_id: &str) -> Vec<Task> {
        let mut tasks = self.store.list(|t| t.meta.user_id == user_id).await;
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Pending tasks, oldest first.
    pub async fn pending_tasks(&self) -> Vec<Task> {
        let mut tasks = self
            .store
            .list(|t| t.status == TaskStatus::Pending)
            .await;
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    /// Delete terminal tasks at least `retention` old. Returns the number removed.
    pub async fn expire_old_tasks(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let expired = self
            .store
            .list(|t| t.status.is_terminal() && t.age(now) >= retention)
            .await;

        let mut removed = 0;
        for task in expired {
            if self.store.delete(task.id).await.is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(count = removed, "Expired old tasks");
        }
        removed
    }

    /// Reload snapshots after a restart and settle interrupted tasks.
    ///
    /// Executable tasks older than `max_age` become TIMEOUT. Younger ones are
    /// reset to PENDING and their ids returned, oldest first, for re-dispatch.
    pub async fn recover_pending_tasks(&self, max_age: Duration) -> Vec<Uuid> {
        let loaded = self.store.load_all().await;
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();

        let mut stale = self.store.list(|t| t.status.is_executable()).await;
        stale.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut resumable = Vec::new();
        let mut timed_out = 0;
        for task in stale {
            let update = if task.age(now) > max_age {
                timed_out += 1;
                TaskUpdate::new()
                    .status(TaskStatus::Timeout)
                    .message(TaskStatus::Timeout.label())
                    .error("Task timed out during service restart")
            } else {
                resumable.push(task.id);
                TaskUpdate::new()
                    .status(TaskStatus::Pending)
                    .progress(0)
                    .message("Recovered after restart, waiting to be processed")
            };
            if let Err(e) = self.update_task(task.id, update).await {
                tracing::warn!(task_id = %task.id, error = %e, "Failed to recover task");
            }
        }

        tracing::info!(
            loaded,
            resumable = resumable.len(),
            timed_out,
            "Task recovery complete"
        );
        resumable
    }

    /// Counts per status.
    pub async fn queue_stats(&self) -> QueueStats {
        let tasks = self.store.list(|_| true).await;
        let mut stats = QueueStats {
            total: tasks.len(),
            ..QueueStats::default()
        };
        for task in &tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Timeout => stats.timeout += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Wait for queued durable writes to land.
    pub async fn flush(&self) {
        self.store.flush().await;
    }
}
