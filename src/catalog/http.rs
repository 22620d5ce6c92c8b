//! HTTP implementation of [`CatalogAdapter`]
//!
//! Endpoints, relative to the configured base url:
//! - `GET content/{kind}/{id}` returns a [`ContentDescriptor`]
//! - media and thumbnail urls from the descriptor are fetched as-is
//!   (relative urls resolve against the base)
//! - `POST sync` delivers one mutation payload as JSON

use super::{ByteStream, CatalogAdapter, ContentDescriptor, MutationAck};
use crate::error::CatalogError;
use crate::types::{ContentId, Quality};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

/// Connect timeout for catalog requests
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default whole-request timeout for small calls (descriptors, sync, thumbnails)
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Catalog adapter backed by a REST service
#[derive(Clone, Debug)]
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpCatalog {
    /// Create an adapter for the service rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        // No total timeout on the shared client: media streams are long-lived
        // and guarded by the scheduler's stall timeout instead
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "Failed to create HTTP client: {}",
                    e
                )))
            })?;

        Self::with_client(client, base_url)
    }

    /// Create an adapter with a preconfigured client (auth headers, proxies)
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url).map_err(|e| Error::Config {
            message: format!("invalid catalog base url '{}': {}", base_url, e),
            key: Some("catalog_base_url".to_string()),
        })?;

        if base_url.cannot_be_a_base() {
            return Err(Error::Config {
                message: format!("catalog base url '{}' cannot be a base", base_url),
                key: Some("catalog_base_url".to_string()),
            });
        }

        // Ensure relative joins append instead of replacing the last segment
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        })
    }

    /// Override the timeout for descriptor, sync and thumbnail requests
    ///
    /// Media streams are not bounded by it.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Base url every endpoint is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, CatalogError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::Rejected(format!("invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn resolve(&self, location: &str) -> std::result::Result<Url, CatalogError> {
        self.base_url
            .join(location)
            .map_err(|e| CatalogError::Rejected(format!("invalid url '{}': {}", location, e)))
    }

    async fn get_checked(
        &self,
        url: Url,
        timeout: Option<Duration>,
    ) -> std::result::Result<reqwest::Response, CatalogError> {
        let mut request = self.client.get(url.clone());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(classify_request_error)?;
        check_status(response, url.as_str()).await
    }
}

#[async_trait]
impl CatalogAdapter for HttpCatalog {
    async fn fetch_content_descriptor(
        &self,
        id: &ContentId,
    ) -> std::result::Result<ContentDescriptor, CatalogError> {
        let url = self.endpoint(&["content", id.kind.as_str(), &id.id])?;

        let response = self
            .client
            .get(url.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(classify_request_error)?;
        let response = check_status(response, url.as_str()).await?;

        let mut descriptor: ContentDescriptor =
            response.json().await.map_err(classify_request_error)?;

        // The path is authoritative for identity
        descriptor.id = id.clone();
        Ok(descriptor)
    }

    async fn open_byte_stream(
        &self,
        descriptor: &ContentDescriptor,
        quality: Quality,
    ) -> std::result::Result<ByteStream, CatalogError> {
        let Some(location) = descriptor.media_url(quality) else {
            let body = descriptor.metadata_bytes()?;
            return Ok(futures::stream::once(async move { Ok(body) }).boxed());
        };

        let url = self.resolve(location)?;
        tracing::debug!(content_id = %descriptor.id, url = %url, "Opening media stream");

        let response = self.get_checked(url, None).await?;
        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| CatalogError::Transient(format!("stream interrupted: {}", e)))
        });

        Ok(stream.boxed())
    }

    async fn submit_mutation(
        &self,
        payload: &serde_json::Value,
    ) -> std::result::Result<MutationAck, CatalogError> {
        let url = self.endpoint(&["sync"])?;

        let response = self
            .client
            .post(url.clone())
            .timeout(self.request_timeout)
            .json(payload)
            .send()
            .await
            .map_err(classify_request_error)?;
        let response = check_status(response, url.as_str()).await?;

        let body = response.text().await.map_err(classify_request_error)?;
        if body.trim().is_empty() {
            return Ok(MutationAck::default());
        }
        // The body is informational; an unexpected shape still counts as delivered
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }

    async fn fetch_thumbnail(
        &self,
        descriptor: &ContentDescriptor,
    ) -> std::result::Result<Option<Vec<u8>>, CatalogError> {
        let Some(location) = descriptor.thumbnail_url.as_deref() else {
            return Ok(None);
        };

        let url = self.resolve(location)?;
        // Thumbnails are fetched in the background and must not hang forever
        let response = self.get_checked(url, Some(self.request_timeout)).await?;
        let bytes = response.bytes().await.map_err(classify_request_error)?;
        Ok(Some(bytes.to_vec()))
    }
}

/// Map a non-success status to the catalog error taxonomy
async fn check_status(
    response: reqwest::Response,
    url: &str,
) -> std::result::Result<reqwest::Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        format!("{} {}", status, url)
    } else {
        format!("{} {}: {}", status, url, truncate(&body, 200))
    };

    Err(classify_status(status, detail))
}

pub(crate) fn classify_status(status: StatusCode, detail: String) -> CatalogError {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        CatalogError::Transient(detail)
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        CatalogError::NotFound(detail)
    } else {
        CatalogError::Rejected(detail)
    }
}

fn classify_request_error(e: reqwest::Error) -> CatalogError {
    if e.is_timeout() || e.is_connect() || e.is_body() {
        CatalogError::Transient(e.to_string())
    } else {
        CatalogError::Http(e)
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentKind;

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            CatalogError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            CatalogError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, String::new()),
            CatalogError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, String::new()),
            CatalogError::Rejected(_)
        ));
    }

    #[test]
    fn endpoints_append_to_base_path() {
        let catalog = HttpCatalog::new("https://api.example.com/v1").unwrap();
        let url = catalog
            .endpoint(&["content", ContentKind::Video.as_str(), "a b"])
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/content/video/a%20b");

        let sync = catalog.endpoint(&["sync"]).unwrap();
        assert_eq!(sync.as_str(), "https://api.example.com/v1/sync");
    }

    #[test]
    fn relative_media_urls_resolve_against_base() {
        let catalog = HttpCatalog::new("https://api.example.com/v1/").unwrap();
        assert_eq!(
            catalog.resolve("media/1.mp4").unwrap().as_str(),
            "https://api.example.com/v1/media/1.mp4"
        );
        assert_eq!(
            catalog.resolve("https://cdn.example.com/x.mp4").unwrap().as_str(),
            "https://cdn.example.com/x.mp4"
        );
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        match HttpCatalog::new("not a url") {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("catalog_base_url")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
