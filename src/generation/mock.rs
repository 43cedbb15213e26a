//! Mock generator returning canned images after a randomized delay.

use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use super::{GenerationOutput, GenerationRequest, ImageGenerator};
use crate::error::GenerationError;

const CANNED_IMAGES: &[&str] = &[
    "https://wms.webinfra.cloud/mock/art-photo-1.jpg",
    "https://wms.webinfra.cloud/mock/art-photo-2.jpg",
    "https://wms.webinfra.cloud/mock/art-photo-3.jpg",
    "https://wms.webinfra.cloud/mock/art-photo-4.jpg",
];

pub struct MockImageGenerator {
    delay_ms: Range<u64>,
}

impl MockImageGenerator {
    /// Delay between 2 and 5 seconds.
    pub fn new() -> Self {
        Self {
            delay_ms: 2_000..5_000,
        }
    }

    pub fn with_delay(delay: Range<Duration>) -> Self {
        Self {
            delay_ms: delay.start.as_millis() as u64..delay.end.as_millis() as u64,
        }
    }

    fn pick_delay(&self) -> Duration {
        if self.delay_ms.is_empty() {
            return Duration::from_millis(self.delay_ms.start);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.delay_ms.clone()))
    }
}

impl Default for MockImageGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationOutput, GenerationError> {
        let delay = self.pick_delay();
        tracing::debug!(
            mode = %request.mode,
            images = request.image_urls.len(),
            delay_ms = delay.as_millis() as u64,
            "Mock generation started"
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(GenerationOutput::DirectImages(
                CANNED_IMAGES.iter().map(|s| s.to_string()).collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::model::{GenerationMode, TaskParams};

    fn request() -> GenerationRequest {
        let params = TaskParams::new(GenerationMode::Transform, "u1", vec!["https://x/a.jpg".into()]);
        GenerationRequest::from_params(&params, "cdn.test")
    }

    #[tokio::test(start_paused = true)]
    async fn returns_canned_images() {
        let generator = MockImageGenerator::new();
        let output = generator
            .generate(request(), CancellationToken::new())
            .await
            .unwrap();
        match output {
            GenerationOutput::DirectImages(images) => assert_eq!(images.len(), 4),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_within_range() {
        let generator =
            MockImageGenerator::with_delay(Duration::from_secs(1)..Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        generator
            .generate(request(), CancellationToken::new())
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn cancellation_stops_generation() {
        let generator = MockImageGenerator::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = generator.generate(request(), cancel).await.unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled));
    }
}
