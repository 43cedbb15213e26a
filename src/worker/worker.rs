//! Per-task execution: dedup guard, staged progress, timeout race, retry bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{GenerationError, TaskError};
use crate::generation::{GenerationOutput, GenerationRequest, ImageGenerator};
use crate::storage::{StorageService, rehost_foreign};
use crate::store::{HistoryRecord, HistoryStatus, HistoryStore, HistoryUpdate};
use crate::tasks::model::{Task, TaskParams, TaskResult, TaskUpdate};
use crate::tasks::service::TaskQueueService;
use crate::tasks::state::TaskStatus;

/// Shared dependencies for task execution.
#[derive(Clone)]
pub struct WorkerDeps {
    pub service: Arc<TaskQueueService>,
    pub generator: Arc<dyn ImageGenerator>,
    /// Re-hosting service; generated URLs are kept as-is when absent.
    pub storage: Option<Arc<dyn StorageService>>,
    /// History/audit store. Best-effort only.
    pub history: Option<Arc<dyn HistoryStore>>,
    /// Deadline for one generation call.
    pub timeout: Duration,
    /// Canonical storage host.
    pub storage_domain: String,
}

/// How a call to `execute_task` ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Another execution of the same task is in flight.
    AlreadyRunning,
    /// The task is missing or not in an executable state.
    NotExecutable,
    Completed { images: Vec<String> },
    Failed { error: String, retryable: bool },
    TimedOut { retryable: bool },
    /// The task was cancelled while running; its record was left as is.
    Cancelled,
}

/// An in-flight execution.
struct ActiveEntry {
    cancel: CancellationToken,
    /// Set by `retry_task` when the task was reset while this run still held it.
    rerun: bool,
}

type ActiveMap = Mutex<HashMap<Uuid, ActiveEntry>>;

/// Removes a task from the active set when dropped.
struct ActiveGuard<'a> {
    active: &'a ActiveMap,
    id: Uuid,
    released: bool,
}

impl<'a> ActiveGuard<'a> {
    fn acquire(active: &'a ActiveMap, id: Uuid) -> Option<(Self, CancellationToken)> {
        let mut map = active.lock().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(&id) {
            return None;
        }
        let cancel = CancellationToken::new();
        map.insert(
            id,
            ActiveEntry {
                cancel: cancel.clone(),
                rerun: false,
            },
        );
        Some((
            Self {
                active,
                id,
                released: false,
            },
            cancel,
        ))
    }

    /// Leave the active set. Returns whether a rerun was requested meanwhile.
    fn release(mut self) -> bool {
        self.released = true;
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id)
            .is_some_and(|entry| entry.rerun)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.active
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&self.id);
        }
    }
}

/// History change to report once the active slot is released.
struct HistoryNote {
    images: Option<Vec<String>>,
    status: HistoryStatus,
}

/// Executes generation tasks. Shared by `Arc`.
pub struct Worker {
    deps: WorkerDeps,
    active: ActiveMap,
}

impl Worker {
    pub fn new(deps: WorkerDeps) -> Self {
        Self {
            deps,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn service(&self) -> &Arc<TaskQueueService> {
        &self.deps.service
    }

    fn history(&self) -> Option<&Arc<dyn HistoryStore>> {
        self.deps.history.as_ref()
    }

    /// Whether an execution of `id` is in flight.
    pub fn is_running(&self, id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    /// Validate params, create the task and schedule its execution.
    ///
    /// Returns as soon as the task is recorded; execution runs in the background.
    pub async fn submit(self: &Arc<Self>, params: TaskParams) -> Result<Task, TaskError> {
        params
            .validate()
            .map_err(|reason| TaskError::InvalidParams { reason })?;

        let task = self.service().create_task(params).await;

        if let Some(history) = self.history() {
            let record = HistoryRecord::for_submission(&task);
            if let Err(e) = history.insert(&record).await {
                tracing::warn!(task_id = %task.id, error = %e, "Failed to record submission history");
            }
        }

        self.dispatch(task.id);
        Ok(task)
    }

    /// Run `execute_task` in the background.
    pub fn dispatch(self: &Arc<Self>, id: Uuid) -> JoinHandle<ExecutionOutcome> {
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.execute_task(id).await })
    }

    /// Re-dispatch recovered tasks, `stagger` apart.
    pub fn resume(self: &Arc<Self>, ids: Vec<Uuid>, stagger: Duration) -> JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            for (i, id) in ids.into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(stagger).await;
                }
                tracing::info!(task_id = %id, "Resuming recovered task");
                worker.dispatch(id);
            }
        })
    }

    /// Execute one task end to end. Never returns an error: every failure
    /// becomes a task state change.
    ///
    /// A retry that resets the task before this run lets go of it is picked
    /// up here and executed once more.
    pub async fn execute_task(&self, id: Uuid) -> ExecutionOutcome {
        let Some((mut guard, mut cancel)) = ActiveGuard::acquire(&self.active, id) else {
            tracing::debug!(task_id = %id, "Task already executing, skipping duplicate dispatch");
            return ExecutionOutcome::AlreadyRunning;
        };

        loop {
            let (outcome, note) = self.run_once(id, &cancel).await;
            let rerun = guard.release();

            if let Some(note) = note {
                self.notify_history(id, note.images, note.status).await;
            }
            if !rerun {
                return outcome;
            }

            tracing::info!(task_id = %id, "Task was retried during execution, running again");
            match ActiveGuard::acquire(&self.active, id) {
                Some((next, token)) => {
                    guard = next;
                    cancel = token;
                }
                // Another dispatch took over.
                None => return outcome,
            }
        }
    }

    async fn run_once(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> (ExecutionOutcome, Option<HistoryNote>) {
        let task = match self.service().get_task(id).await {
            Some(task) if task.status.is_executable() => task,
            Some(task) => {
                tracing::debug!(task_id = %id, status = %task.status, "Task not executable");
                return (ExecutionOutcome::NotExecutable, None);
            }
            None => {
                tracing::warn!(task_id = %id, "Task to execute not found");
                return (ExecutionOutcome::NotExecutable, None);
            }
        };

        let started = self
            .service()
            .update_task(
                id,
                TaskUpdate::new()
                    .status(TaskStatus::Processing)
                    .progress(10)
                    .message("Connecting to generation service")
                    .started_now(),
            )
            .await;
        if !matches!(started, Ok(Some(_))) {
            return (ExecutionOutcome::NotExecutable, None);
        }
        tracing::info!(task_id = %id, mode = %task.params.mode, "Task execution started");

        match self.run_generation(&task, cancel).await {
            Ok(images) => self.complete(id, images).await,
            Err(_) if cancel.is_cancelled() => {
                tracing::info!(task_id = %id, "Task cancelled during execution");
                (ExecutionOutcome::Cancelled, None)
            }
            Err(e) => self.fail(id, e).await,
        }
    }

    /// Steps that may fail: generation, normalization, re-hosting.
    async fn run_generation(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, GenerationError> {
        self.stage(task.id, 30, TaskStatus::Processing.label()).await?;

        let request = GenerationRequest::from_params(&task.params, &self.deps.storage_domain);
        let call_token = cancel.child_token();
        let output = match tokio::time::timeout(
            self.deps.timeout,
            self.deps.generator.generate(request, call_token.clone()),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                // Stop the abandoned call.
                call_token.cancel();
                return Err(GenerationError::Timeout {
                    timeout: self.deps.timeout,
                });
            }
        };

        let images = self.resolve_output(output).await?;
        if images.is_empty() {
            return Err(GenerationError::NoImages);
        }

        self.stage(task.id, 80, "Processing results").await?;

        Ok(match &self.deps.storage {
            Some(storage) => {
                rehost_foreign(storage.as_ref(), images, &self.deps.storage_domain).await
            }
            None => images,
        })
    }

    /// Turn generator output into image URLs.
    async fn resolve_output(
        &self,
        output: GenerationOutput,
    ) -> Result<Vec<String>, GenerationError> {
        match output {
            GenerationOutput::DirectImages(images) => Ok(images),
            GenerationOutput::HandleRef(handle) => {
                let Some(history) = self.history() else {
                    return Err(GenerationError::HandleNotFound { handle });
                };
                match history.get_by_task_id(&handle).await? {
                    Some(record) => Ok(record.generated_image_urls),
                    None => Err(GenerationError::HandleNotFound { handle }),
                }
            }
        }
    }

    /// Advance progress while the task is still processing.
    async fn stage(&self, id: Uuid, progress: u8, message: &str) -> Result<(), GenerationError> {
        let update = TaskUpdate::new()
            .status(TaskStatus::Processing)
            .progress(progress)
            .message(message);
        match self.service().update_task(id, update).await {
            Ok(Some(_)) => Ok(()),
            // Cancelled or removed underneath us.
            _ => Err(GenerationError::Cancelled),
        }
    }

    async fn complete(
        &self,
        id: Uuid,
        images: Vec<String>,
    ) -> (ExecutionOutcome, Option<HistoryNote>) {
        let update = TaskUpdate::new()
            .status(TaskStatus::Completed)
            .progress(100)
            .message(TaskStatus::Completed.label())
            .result(TaskResult {
                images: images.clone(),
                generated_at: Utc::now(),
            })
            .clear_error()
            .completed_now();

        match self.service().update_task(id, update).await {
            Ok(Some(_)) => {
                tracing::info!(task_id = %id, images = images.len(), "Task completed");
                let note = HistoryNote {
                    images: Some(images.clone()),
                    status: HistoryStatus::Completed,
                };
                (ExecutionOutcome::Completed { images }, Some(note))
            }
            Ok(None) | Err(_) => {
                tracing::info!(task_id = %id, "Task result discarded, task no longer processing");
                (ExecutionOutcome::Cancelled, None)
            }
        }
    }

    async fn fail(
        &self,
        id: Uuid,
        error: GenerationError,
    ) -> (ExecutionOutcome, Option<HistoryNote>) {
        let Some(mut task) = self.service().get_task(id).await else {
            return (ExecutionOutcome::Cancelled, None);
        };
        task.retry_count = (task.retry_count + 1).min(task.max_retries);
        let retry_count = task.retry_count;
        let retryable = task.has_retries_left();
        let timed_out = matches!(error, GenerationError::Timeout { .. });
        let status = if timed_out {
            TaskStatus::Timeout
        } else {
            TaskStatus::Failed
        };
        let message = if retryable {
            format!("{}: {error}", status.label())
        } else {
            format!("{} after reaching max retries: {error}", status.label())
        };

        let update = TaskUpdate::new()
            .status(status)
            .message(message)
            .error(error.to_string())
            .retry_count(retry_count)
            .completed_now();
        if !matches!(self.service().update_task(id, update).await, Ok(Some(_))) {
            return (ExecutionOutcome::Cancelled, None);
        }

        tracing::warn!(
            task_id = %id,
            error = %error,
            retry_count,
            max_retries = task.max_retries,
            retryable,
            "Task execution failed"
        );
        let note = (!retryable).then_some(HistoryNote {
            images: None,
            status: HistoryStatus::Failed,
        });

        let outcome = if timed_out {
            ExecutionOutcome::TimedOut { retryable }
        } else {
            ExecutionOutcome::Failed {
                error: error.to_string(),
                retryable,
            }
        };
        (outcome, note)
    }

    /// Best-effort update of the task's history record.
    async fn notify_history(&self, id: Uuid, images: Option<Vec<String>>, status: HistoryStatus) {
        let Some(history) = self.history() else {
            return;
        };
        let record = match history.get_by_task_id(&id.to_string()).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(task_id = %id, "No history record to update");
                return;
            }
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "History lookup failed");
                return;
            }
        };
        if let Err(e) = history.update(record.id, HistoryUpdate { images, status }).await {
            tracing::warn!(task_id = %id, error = %e, "Failed to update history record");
        }
    }

    /// Reset a failed or timed-out task and execute it again in the background.
    pub async fn retry_task(self: &Arc<Self>, id: Uuid) -> Result<Task, TaskError> {
        let task = self
            .service()
            .get_task(id)
            .await
            .ok_or(TaskError::NotFound { id })?;
        if !task.status.is_retryable() {
            return Err(TaskError::InvalidTransition {
                id,
                state: task.status.to_string(),
                target: TaskStatus::Pending.to_string(),
            });
        }

        let update = TaskUpdate::new()
            .status(TaskStatus::Pending)
            .progress(0)
            .retry_count(0)
            .message("Retrying, waiting to be processed")
            .clear_error();
        let task = self
            .service()
            .update_task(id, update)
            .await?
            .ok_or(TaskError::NotFound { id })?;

        tracing::info!(task_id = %id, "Task queued for retry");
        if !self.request_rerun(id) {
            self.dispatch(id);
        }
        Ok(task)
    }

    /// Flag a still-active execution of `id` to run again once it finishes.
    /// Returns false when nothing is running.
    fn request_rerun(&self, id: Uuid) -> bool {
        match self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&id)
        {
            Some(entry) => {
                entry.rerun = true;
                true
            }
            None => false,
        }
    }

    /// Cancel any task that has not completed. Cancelling twice is a no-op.
    pub async fn cancel_task(&self, id: Uuid) -> Result<Task, TaskError> {
        let task = self
            .service()
            .get_task(id)
            .await
            .ok_or(TaskError::NotFound { id })?;
        match task.status {
            TaskStatus::Cancelled => return Ok(task),
            TaskStatus::Completed => {
                return Err(TaskError::InvalidTransition {
                    id,
                    state: task.status.to_string(),
                    target: TaskStatus::Cancelled.to_string(),
                });
            }
            _ => {}
        }

        let update = TaskUpdate::new()
            .status(TaskStatus::Cancelled)
            .message(TaskStatus::Cancelled.label())
            .completed_now();
        let task = self
            .service()
            .update_task(id, update)
            .await?
            .ok_or(TaskError::NotFound { id })?;

        let token = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .map(|entry| entry.cancel.clone());
        if let Some(token) = token {
            token.cancel();
        }

        tracing::info!(task_id = %id, "Task cancelled");
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::config::QueueConfig;
    use crate::error::DatabaseError;
    use crate::store::LibSqlBackend;
    use crate::tasks::model::GenerationMode;

    /// Waits for cancellation after signalling that it started.
    struct BlockingGenerator {
        started: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageGenerator for BlockingGenerator {
        fn name(&self) -> &str {
            "blocking"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
            cancel: CancellationToken,
        ) -> Result<GenerationOutput, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            cancel.cancelled().await;
            Err(GenerationError::Cancelled)
        }
    }

    /// Returns a fixed history handle.
    struct HandleGenerator;

    #[async_trait]
    impl ImageGenerator for HandleGenerator {
        fn name(&self) -> &str {
            "handle"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
            _cancel: CancellationToken,
        ) -> Result<GenerationOutput, GenerationError> {
            Ok(GenerationOutput::HandleRef("gen-handle-1".into()))
        }
    }

    /// Fails the first call, then returns one image.
    #[derive(Default)]
    struct FailOnceGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageGenerator for FailOnceGenerator {
        fn name(&self) -> &str {
            "fail-once"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
            _cancel: CancellationToken,
        ) -> Result<GenerationOutput, GenerationError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(GenerationError::RequestFailed {
                    reason: "backend busy".into(),
                });
            }
            Ok(GenerationOutput::DirectImages(vec![
                "https://cdn.test/again.jpg".into(),
            ]))
        }
    }

    /// History store whose first lookup waits for `gate`.
    #[derive(Default)]
    struct GatedHistory {
        lookups: AtomicUsize,
        entered: Notify,
        gate: Notify,
    }

    #[async_trait]
    impl HistoryStore for GatedHistory {
        async fn insert(&self, _record: &HistoryRecord) -> Result<(), DatabaseError> {
            Ok(())
        }

        async fn get_by_task_id(
            &self,
            _task_id: &str,
        ) -> Result<Option<HistoryRecord>, DatabaseError> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                self.entered.notify_one();
                self.gate.notified().await;
            }
            Ok(None)
        }

        async fn update(
            &self,
            _record_id: Uuid,
            _update: HistoryUpdate,
        ) -> Result<(), DatabaseError> {
            Ok(())
        }
    }

    fn deps(
        generator: Arc<dyn ImageGenerator>,
        history: Option<Arc<dyn HistoryStore>>,
    ) -> WorkerDeps {
        WorkerDeps {
            service: Arc::new(TaskQueueService::in_memory(QueueConfig::default())),
            generator,
            storage: None,
            history,
            timeout: Duration::from_secs(120),
            storage_domain: "cdn.test".into(),
        }
    }

    fn params() -> TaskParams {
        TaskParams::new(GenerationMode::Transform, "u1", vec!["https://x/a.jpg".into()])
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let active = Mutex::new(HashMap::new());
        let id = Uuid::new_v4();
        {
            let (_guard, _token) = ActiveGuard::acquire(&active, id).unwrap();
            assert!(ActiveGuard::acquire(&active, id).is_none());
        }
        assert!(ActiveGuard::acquire(&active, id).is_some());
    }

    #[tokio::test]
    async fn cancel_while_generating_stops_execution() {
        let generator = Arc::new(BlockingGenerator {
            started: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let worker = Arc::new(Worker::new(deps(generator.clone(), None)));
        let task = worker.service().create_task(params()).await;

        let handle = worker.dispatch(task.id);
        generator.started.notified().await;
        assert!(worker.is_running(task.id));

        let cancelled = worker.cancel_task(task.id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert_eq!(handle.await.unwrap(), ExecutionOutcome::Cancelled);

        let task = worker.service().get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.completed_at.is_some());
        assert!(!worker.is_running(task.id));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handle_output_resolved_through_history() {
        let history = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let now = Utc::now();
        history
            .insert(&HistoryRecord {
                id: Uuid::new_v4(),
                task_id: "gen-handle-1".into(),
                user_id: "u1".into(),
                mode: None,
                original_image_urls: vec![],
                generated_image_urls: vec!["https://cdn.test/h1.jpg".into()],
                status: HistoryStatus::Completed,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let worker = Arc::new(Worker::new(deps(
            Arc::new(HandleGenerator),
            Some(history.clone() as Arc<dyn HistoryStore>),
        )));
        let task = worker.service().create_task(params()).await;
        history
            .insert(&HistoryRecord::for_submission(&task))
            .await
            .unwrap();

        let outcome = worker.execute_task(task.id).await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Completed {
                images: vec!["https://cdn.test/h1.jpg".to_string()]
            }
        );

        let done = worker.service().get_task(task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(
            done.result.unwrap().images,
            vec!["https://cdn.test/h1.jpg".to_string()]
        );

        let record = history
            .get_by_task_id(&task.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, HistoryStatus::Completed);
    }

    #[tokio::test]
    async fn missing_handle_fails_task() {
        let worker = Arc::new(Worker::new(deps(Arc::new(HandleGenerator), None)));
        let task = worker.service().create_task(params()).await;

        let outcome = worker.execute_task(task.id).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed { retryable: true, .. }
        ));
        let task = worker.service().get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 1);
        assert!(task.error.unwrap().contains("gen-handle-1"));
    }

    #[tokio::test]
    async fn retry_during_history_update_runs_again() {
        let history = Arc::new(GatedHistory::default());
        let generator = Arc::new(FailOnceGenerator::default());
        let worker = Arc::new(Worker::new(deps(
            generator.clone(),
            Some(history.clone() as Arc<dyn HistoryStore>),
        )));
        let task = worker
            .service()
            .create_task(params().with_max_retries(1))
            .await;

        let first = worker.dispatch(task.id);
        history.entered.notified().await;
        assert_eq!(
            worker.service().get_task(task.id).await.unwrap().status,
            TaskStatus::Failed
        );

        let reset = worker.retry_task(task.id).await.unwrap();
        assert_eq!(reset.status, TaskStatus::Pending);
        history.gate.notify_one();
        assert!(matches!(
            first.await.unwrap(),
            ExecutionOutcome::Failed { retryable: false, .. }
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let task = worker.service().get_task(task.id).await.unwrap();
                if task.status == TaskStatus::Completed {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("retried task never completed");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_while_still_active_flags_rerun() {
        let generator = Arc::new(FailOnceGenerator::default());
        let worker = Arc::new(Worker::new(deps(generator.clone(), None)));
        let task = worker.service().create_task(params()).await;
        for status in [TaskStatus::Processing, TaskStatus::Failed] {
            worker
                .service()
                .update_task(task.id, TaskUpdate::new().status(status))
                .await
                .unwrap();
        }

        let (guard, _token) = ActiveGuard::acquire(&worker.active, task.id).unwrap();
        let reset = worker.retry_task(task.id).await.unwrap();
        assert_eq!(reset.status, TaskStatus::Pending);
        tokio::task::yield_now().await;
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);

        assert!(guard.release());
        assert!(!worker.is_running(task.id));
        assert!(matches!(
            worker.execute_task(task.id).await,
            ExecutionOutcome::Failed { retryable: true, .. }
        ));
    }

    #[tokio::test]
    async fn submit_rejects_invalid_params() {
        let worker = Arc::new(Worker::new(deps(Arc::new(HandleGenerator), None)));
        let bad = TaskParams::new(GenerationMode::Puzzle, "u1", vec!["a.jpg".into()]);
        let err = worker.submit(bad).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidParams { .. }));
        assert_eq!(worker.service().queue_stats().await.total, 0);
    }
}
