//! HTTP generator for OpenAI-style `images/generations` endpoints.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{GenerationOutput, GenerationRequest, ImageGenerator};
use crate::config::GeneratorConfig;
use crate::error::GenerationError;
use crate::tasks::model::{GenerationMode, PaymentTier};

/// Upper bound on images produced per request.
const MAX_OUTPUT_IMAGES: u32 = 4;

pub struct HttpImageGenerator {
    config: GeneratorConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Option<Vec<ImageDatum>>,
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

impl HttpImageGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/images/generations",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "prompt": request.prompt,
            "image": request.image_urls,
            "size": "2K",
            "sequential_image_generation": "auto",
            "sequential_image_generation_options": { "max_images": MAX_OUTPUT_IMAGES },
            "stream": false,
            "response_format": "url",
            "watermark": request.payment_tier == PaymentTier::Free,
        });
        if let Some(obj) = body.as_object_mut() {
            if request.mode == GenerationMode::Transform {
                obj.insert(
                    "optimize_prompt_options".into(),
                    serde_json::json!({ "mode": "standard" }),
                );
            }
            if let Some(positions) = &request.face_positions {
                obj.insert("face_positions".into(), positions.clone());
            }
            for (key, value) in &request.model_params {
                obj.insert(key.clone(), value.clone());
            }
        }
        body
    }

    async fn call(&self, request: &GenerationRequest) -> Result<GenerationOutput, GenerationError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::InvalidResponse {
                reason: e.to_string(),
            })?;
        let parsed: ImagesResponse =
            serde_json::from_str(&text).map_err(|e| GenerationError::InvalidResponse {
                reason: format!("unparseable body ({status}): {e}"),
            })?;

        if !status.is_success() {
            let reason = parsed
                .error
                .and_then(|e| e.message)
                .or(parsed.message)
                .unwrap_or_else(|| format!("generation service returned {status}"));
            return Err(GenerationError::RequestFailed { reason });
        }

        match parsed.data {
            Some(data) => Ok(GenerationOutput::DirectImages(extract_images(data))),
            None => Err(match parsed.error.and_then(|e| e.message) {
                Some(reason) => GenerationError::RequestFailed { reason },
                None => GenerationError::InvalidResponse {
                    reason: "response has no image data".into(),
                },
            }),
        }
    }
}

/// Collect URLs, turning base64 payloads into data URIs. Per-image errors are skipped.
fn extract_images(data: Vec<ImageDatum>) -> Vec<String> {
    data.into_iter()
        .filter_map(|item| {
            if let Some(url) = item.url {
                Some(url)
            } else if let Some(b64) = item.b64_json {
                Some(format!("data:image/jpeg;base64,{b64}"))
            } else {
                if let Some(err) = item.error {
                    tracing::warn!(
                        error = err.message.as_deref().unwrap_or("unknown"),
                        "Generation service skipped one image"
                    );
                }
                None
            }
        })
        .collect()
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationOutput, GenerationError> {
        tracing::info!(
            mode = %request.mode,
            images = request.image_urls.len(),
            model = %self.config.model,
            "Calling generation service"
        );
        if request.image_urls.is_empty() {
            return Err(GenerationError::RequestFailed {
                reason: "no usable reference images".into(),
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            result = self.call(&request) => result,
        }
    }
}
