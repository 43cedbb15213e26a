//! Client-side adaptive polling of a task until it reaches a terminal status.
//!
//! Polls immediately, then backs off multiplicatively up to a cap. Fetch
//! errors keep the current interval. Exactly one of the complete/error
//! callbacks fires, unless the poll is cancelled first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PollError;
use crate::tasks::model::TaskSnapshot;
use crate::tasks::state::TaskStatus;

/// Backoff schedule and wall-clock budget.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Total time before giving up with a timeout error.
    pub budget: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(5),
            multiplier: 1.2,
            budget: Duration::from_secs(180), // 3 minutes
        }
    }
}

impl PollConfig {
    fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_interval)
    }
}

/// Reads the current state of a task.
#[async_trait]
pub trait TaskFetcher: Send + Sync {
    async fn fetch(&self, id: Uuid) -> Result<TaskSnapshot, PollError>;
}

/// Why polling reported an error.
#[derive(Debug)]
pub enum PollFailure {
    /// The task itself ended as FAILED, TIMEOUT or CANCELLED.
    Task(Box<TaskSnapshot>),
    /// The wall-clock budget ran out first.
    TimedOut(Duration),
}

impl std::fmt::Display for PollFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task(snapshot) => write!(
                f,
                "task ended as {}: {}",
                snapshot.status,
                snapshot.error.as_deref().unwrap_or(&snapshot.message)
            ),
            Self::TimedOut(budget) => write!(f, "polling gave up after {budget:?}"),
        }
    }
}

impl std::error::Error for PollFailure {}

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEnd {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

type ProgressFn = Box<dyn FnMut(&TaskSnapshot) + Send>;
type CompleteFn = Box<dyn FnOnce(TaskSnapshot) + Send>;
type ErrorFn = Box<dyn FnOnce(PollFailure) + Send>;

/// Consumer callbacks.
pub struct PollCallbacks {
    on_progress: ProgressFn,
    on_complete: CompleteFn,
    on_error: ErrorFn,
}

impl PollCallbacks {
    pub fn new(
        on_complete: impl FnOnce(TaskSnapshot) + Send + 'static,
        on_error: impl FnOnce(PollFailure) + Send + 'static,
    ) -> Self {
        Self {
            on_progress: Box::new(|_| {}),
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
        }
    }

    /// Called with every non-terminal snapshot.
    pub fn on_progress(mut self, f: impl FnMut(&TaskSnapshot) + Send + 'static) -> Self {
        self.on_progress = Box::new(f);
        self
    }
}

/// Handle to a running poll loop.
pub struct PollHandle {
    cancel: CancellationToken,
    handle: JoinHandle<PollEnd>,
}

impl PollHandle {
    /// Stop scheduling polls. A fetch already in flight completes but its
    /// result is ignored.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the loop to end.
    pub async fn join(self) -> PollEnd {
        match self.handle.await {
            Ok(end) => end,
            Err(e) => {
                tracing::warn!(error = %e, "Poll task failed");
                PollEnd::Cancelled
            }
        }
    }
}

/// Start polling `id` in the background.
pub fn poll_task(
    fetcher: Arc<dyn TaskFetcher>,
    id: Uuid,
    config: PollConfig,
    callbacks: PollCallbacks,
) -> PollHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle =
        tokio::spawn(async move { run_poll(fetcher.as_ref(), id, &config, callbacks, token).await });
    PollHandle { cancel, handle }
}

/// The poll loop. Returns once a callback has fired or `cancel` is triggered.
pub async fn run_poll(
    fetcher: &dyn TaskFetcher,
    id: Uuid,
    config: &PollConfig,
    callbacks: PollCallbacks,
    cancel: CancellationToken,
) -> PollEnd {
    let PollCallbacks {
        mut on_progress,
        on_complete,
        on_error,
    } = callbacks;
    let deadline = Instant::now().checked_add(config.budget);
    let mut interval = config.initial_interval;

    loop {
        if cancel.is_cancelled() {
            return PollEnd::Cancelled;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            tracing::warn!(task_id = %id, "Polling budget exhausted");
            on_error(PollFailure::TimedOut(config.budget));
            return PollEnd::TimedOut;
        }

        let result = fetcher.fetch(id).await;
        if cancel.is_cancelled() {
            tracing::debug!(task_id = %id, "Poll cancelled, discarding response");
            return PollEnd::Cancelled;
        }

        let succeeded = result.is_ok();
        match result {
            Ok(snapshot) if snapshot.status == TaskStatus::Completed => {
                on_complete(snapshot);
                return PollEnd::Completed;
            }
            Ok(snapshot) if snapshot.status.is_terminal() => {
                on_error(PollFailure::Task(Box::new(snapshot)));
                return PollEnd::Failed;
            }
            Ok(snapshot) => {
                on_progress(&snapshot);
            }
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "Poll failed, retrying");
            }
        }

        // Never sleep past the budget.
        let mut wake = Instant::now() + interval;
        if let Some(deadline) = deadline {
            wake = wake.min(deadline);
        }
        tokio::select! {
            _ = cancel.cancelled() => return PollEnd::Cancelled,
            _ = tokio::time::sleep_until(wake) => {}
        }
        // A failed fetch keeps the current interval.
        if succeeded {
            interval = config.next_interval(interval);
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<TaskSnapshot>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Fetches tasks from the HTTP API (`GET {base}/api/task/{id}`).
pub struct HttpTaskFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTaskFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TaskFetcher for HttpTaskFetcher {
    async fn fetch(&self, id: Uuid) -> Result<TaskSnapshot, PollError> {
        let response = self
            .client
            .get(format!("{}/api/task/{id}", self.base_url))
            .send()
            .await
            .map_err(|e| PollError::Http(e.to_string()))?;

        let status = response.status();
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| PollError::InvalidResponse(e.to_string()))?;

        if !status.is_success() || !envelope.success {
            return Err(PollError::Status {
                status: status.as_u16(),
                message: envelope
                    .message
                    .or(envelope.error)
                    .unwrap_or_else(|| status.to_string()),
            });
        }
        envelope
            .data
            .ok_or_else(|| PollError::InvalidResponse("response has no data".into()))
    }
}
