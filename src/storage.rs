//! Re-hosting of generated images onto the canonical storage domain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Object storage that copies images to the canonical domain.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Re-host `urls`, returning one entry per input in the same order.
    ///
    /// `None` marks a URL that could not be migrated. Idempotent.
    async fn rehost(&self, urls: &[String]) -> Result<Vec<Option<String>>, StorageError>;
}

/// Whether `url` is already served from `domain` or one of its subdomains.
pub fn is_canonical_url(url: &str, domain: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };
    match parsed.host_str() {
        Some(host) => {
            host == domain
                || host
                    .strip_suffix(domain)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => false,
    }
}

/// Re-host every URL not on `domain`.
///
/// Never fails: on error the original URLs are kept, and a partial result keeps
/// the migrated URLs alongside the originals of the ones that failed.
pub async fn rehost_foreign(
    storage: &dyn StorageService,
    urls: Vec<String>,
    domain: &str,
) -> Vec<String> {
    let foreign: Vec<usize> = urls
        .iter()
        .enumerate()
        .filter(|(_, url)| !is_canonical_url(url, domain))
        .map(|(i, _)| i)
        .collect();
    if foreign.is_empty() {
        return urls;
    }

    let to_rehost: Vec<String> = foreign.iter().map(|&i| urls[i].clone()).collect();
    let rehosted = match storage.rehost(&to_rehost).await {
        Ok(rehosted) if rehosted.len() == to_rehost.len() => rehosted,
        Ok(rehosted) => {
            tracing::warn!(
                expected = to_rehost.len(),
                got = rehosted.len(),
                "Storage service returned a mismatched URL list, keeping originals"
            );
            return urls;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Image re-hosting failed, keeping originals");
            return urls;
        }
    };

    let mut result = urls;
    let mut kept = 0;
    for (index, new_url) in foreign.into_iter().zip(rehosted) {
        match new_url {
            Some(new_url) => result[index] = new_url,
            None => kept += 1,
        }
    }
    if kept > 0 {
        tracing::warn!(kept, "Some images could not be re-hosted, keeping their originals");
    }
    result
}

#[derive(Debug, Serialize)]
struct RehostRequest<'a> {
    urls: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RehostResponse {
    urls: Vec<Option<String>>,
}

/// Storage service reached over HTTP: `POST {endpoint}` with `{"urls": [...]}`.
pub struct HttpStorageService {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpStorageService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StorageService for HttpStorageService {
    async fn rehost(&self, urls: &[String]) -> Result<Vec<Option<String>>, StorageError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RehostRequest { urls })
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::UploadFailed {
                reason: format!("{status}: {body}"),
            });
        }

        let parsed: RehostResponse =
            response
                .json()
                .await
                .map_err(|e| StorageError::InvalidResponse {
                    reason: e.to_string(),
                })?;
        Ok(parsed.urls)
    }
}
