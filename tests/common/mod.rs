//! Shared stubs for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use art_queue::config::QueueConfig;
use art_queue::error::{GenerationError, StorageError};
use art_queue::generation::{GenerationOutput, GenerationRequest, ImageGenerator};
use art_queue::storage::StorageService;
use art_queue::store::HistoryStore;
use art_queue::tasks::{GenerationMode, TaskParams, TaskQueueService};
use art_queue::worker::{Worker, WorkerDeps};

/// What the stub generator does on each call.
pub enum Behavior {
    Images(Vec<String>),
    /// Sleep, then return images.
    Slow(Duration, Vec<String>),
    Fail,
    /// Fail the first call, succeed afterwards.
    FailOnce(Vec<String>),
    /// Never resolve.
    Hang,
    /// Hang on the first call, return images afterwards.
    HangOnce(Vec<String>),
}

/// Generator stub with a call counter.
pub struct StubGenerator {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl StubGenerator {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for StubGenerator {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(
        &self,
        _request: GenerationRequest,
        _cancel: CancellationToken,
    ) -> Result<GenerationOutput, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Images(images) => Ok(GenerationOutput::DirectImages(images.clone())),
            Behavior::Slow(delay, images) => {
                tokio::time::sleep(*delay).await;
                Ok(GenerationOutput::DirectImages(images.clone()))
            }
            Behavior::Fail => Err(GenerationError::RequestFailed {
                reason: "backend unavailable".into(),
            }),
            Behavior::FailOnce(_) if n == 0 => {
                Err(GenerationError::RequestFailed {
                    reason: "transient backend error".into(),
                })
            }
            Behavior::FailOnce(images) => Ok(GenerationOutput::DirectImages(images.clone())),
            Behavior::Hang => std::future::pending().await,
            Behavior::HangOnce(_) if n == 0 => std::future::pending().await,
            Behavior::HangOnce(images) => Ok(GenerationOutput::DirectImages(images.clone())),
        }
    }
}

/// Re-hosts every URL except those containing "broken".
pub struct PartialStorage;

#[async_trait]
impl StorageService for PartialStorage {
    async fn rehost(&self, urls: &[String]) -> Result<Vec<Option<String>>, StorageError> {
        Ok(urls
            .iter()
            .enumerate()
            .map(|(i, url)| {
                (!url.contains("broken")).then(|| format!("https://cdn.test/rehosted/{i}.jpg"))
            })
            .collect())
    }
}

pub fn worker_with(
    service: Arc<TaskQueueService>,
    generator: Arc<dyn ImageGenerator>,
    storage: Option<Arc<dyn StorageService>>,
    history: Option<Arc<dyn HistoryStore>>,
) -> Arc<Worker> {
    Arc::new(Worker::new(WorkerDeps {
        service,
        generator,
        storage,
        history,
        timeout: QueueConfig::default().generation_timeout,
        storage_domain: "cdn.test".into(),
    }))
}

pub fn in_memory_service() -> Arc<TaskQueueService> {
    Arc::new(TaskQueueService::in_memory(QueueConfig::default()))
}

pub fn puzzle_params(user: &str) -> TaskParams {
    TaskParams::new(
        GenerationMode::Puzzle,
        user,
        vec!["a.jpg".into(), "b.jpg".into()],
    )
}
