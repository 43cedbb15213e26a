//! Image generation boundary.
//!
//! Supports:
//! - **Mock**: canned images after a randomized delay, for environments without a backend
//! - **HTTP**: OpenAI-style `images/generations` endpoint

pub mod http;
pub mod mock;

pub use http::HttpImageGenerator;
pub use mock::MockImageGenerator;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::GeneratorConfig;
use crate::error::GenerationError;
use crate::tasks::model::{GenerationMode, PaymentTier, TaskParams};

/// Maximum number of reference images sent to the generator.
pub const MAX_REFERENCE_IMAGES: usize = 14;

/// Input to a generation call, built from a task's params.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub mode: GenerationMode,
    pub prompt: String,
    /// User photos followed by the template image, normalized to absolute URLs.
    pub image_urls: Vec<String>,
    pub face_positions: Option<serde_json::Value>,
    pub payment_tier: PaymentTier,
    pub model_params: serde_json::Map<String, serde_json::Value>,
}

impl GenerationRequest {
    /// Build a request, expanding relative URLs against `storage_domain`.
    pub fn from_params(params: &TaskParams, storage_domain: &str) -> Self {
        Self {
            mode: params.mode,
            prompt: params.prompt.clone(),
            image_urls: normalize_image_urls(&params.generation_image_urls(), storage_domain),
            face_positions: params.face_positions.clone(),
            payment_tier: params.payment_tier,
            model_params: params.model_params.clone(),
        }
    }
}

/// What a generator hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutput {
    /// Final image URLs.
    DirectImages(Vec<String>),
    /// Opaque handle; the images are in the history store under this id.
    HandleRef(String),
}

/// An image generation backend.
///
/// Implementations should stop work and return `GenerationError::Cancelled`
/// once `cancel` fires.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationOutput, GenerationError>;
}

/// Create a generator: HTTP when configured, mock otherwise.
pub fn create_generator(config: Option<&GeneratorConfig>) -> Arc<dyn ImageGenerator> {
    match config {
        Some(config) => {
            tracing::info!(base_url = %config.base_url, model = %config.model, "Using HTTP image generator");
            Arc::new(HttpImageGenerator::new(config.clone()))
        }
        None => {
            tracing::info!("No generator configured, using mock image generator");
            Arc::new(MockImageGenerator::new())
        }
    }
}

/// Keep data URIs and absolute URLs, expand `/path` against the storage
/// domain, and drop anything else. At most `MAX_REFERENCE_IMAGES` are kept.
pub fn normalize_image_urls(urls: &[String], storage_domain: &str) -> Vec<String> {
    urls.iter()
        .take(MAX_REFERENCE_IMAGES)
        .filter_map(|url| {
            if url.starts_with("data:image/")
                || url.starts_with("http://")
                || url.starts_with("https://")
            {
                Some(url.clone())
            } else if url.starts_with('/') {
                Some(format!("https://{storage_domain}{url}"))
            } else {
                tracing::warn!(url = %url, "Skipping image reference with unknown format");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_urls_expand_against_domain() {
        let urls = vec![
            "/uploads/a.jpg".to_string(),
            "https://cdn.example.com/b.jpg".into(),
            "data:image/png;base64,AAAA".into(),
            "ftp://nope".into(),
        ];
        let normalized = normalize_image_urls(&urls, "img.example.com");
        assert_eq!(
            normalized,
            vec![
                "https://img.example.com/uploads/a.jpg".to_string(),
                "https://cdn.example.com/b.jpg".into(),
                "data:image/png;base64,AAAA".into(),
            ]
        );
    }

    #[test]
    fn reference_images_are_capped() {
        let urls: Vec<String> = (0..20).map(|i| format!("https://x/{i}.jpg")).collect();
        assert_eq!(normalize_image_urls(&urls, "d").len(), MAX_REFERENCE_IMAGES);
    }

    #[test]
    fn request_appends_template_image() {
        let params = TaskParams::new(
            GenerationMode::Puzzle,
            "u1",
            vec!["/a.jpg".into(), "/b.jpg".into()],
        )
        .with_template("t1", "/templates/t1.jpg")
        .with_prompt("family portrait");

        let request = GenerationRequest::from_params(&params, "cdn.test");
        assert_eq!(request.prompt, "family portrait");
        assert_eq!(request.image_urls.len(), 3);
        assert_eq!(request.image_urls[2], "https://cdn.test/templates/t1.jpg");
    }
}
