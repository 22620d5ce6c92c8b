//! Remote content catalog seam
//!
//! The [`CatalogAdapter`] trait is everything the manager needs from the
//! remote learning service: content descriptors, byte streams for media, and
//! a sync endpoint for queued mutations. [`HttpCatalog`] is the production
//! implementation; tests use in-process doubles.

use crate::error::CatalogError;
use crate::types::{ContentId, ContentKind, Quality};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

mod http;

pub use http::HttpCatalog;

/// Stream of byte chunks produced by [`CatalogAdapter::open_byte_stream`]
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, CatalogError>>;

/// Per-quality media urls; missing entries fall back to the descriptor's base url
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityUrls {
    /// Low-quality rendition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<String>,
    /// Medium-quality rendition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    /// High-quality rendition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,
}

/// Remote description of one content item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentDescriptor {
    /// Identity (serialized flat as `kind` + `id`)
    #[serde(flatten)]
    pub id: ContentId,
    /// Display title
    pub title: String,
    /// Announced size in bytes (0 when unknown)
    #[serde(default)]
    pub byte_size: u64,
    /// Base media url; `None` for metadata-only items (courses, lessons)
    #[serde(default)]
    pub url: Option<String>,
    /// Quality-specific media urls
    #[serde(default)]
    pub urls: QualityUrls,
    /// Thumbnail image url
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// File extension for the stored file (without the dot)
    #[serde(default)]
    pub extension: Option<String>,
    /// Hard expiry for the offline copy
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Items contained in this one (course lessons, lesson media)
    #[serde(default)]
    pub children: Vec<ContentId>,
    /// Raw metadata stored as the file body of metadata-only items
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ContentDescriptor {
    /// Minimal descriptor; remaining fields take their defaults
    pub fn new(id: ContentId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            byte_size: 0,
            url: None,
            urls: QualityUrls::default(),
            thumbnail_url: None,
            extension: None,
            expires_at: None,
            children: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Media url for the requested quality, falling back to the base url
    pub fn media_url(&self, quality: Quality) -> Option<&str> {
        let preferred = match quality {
            Quality::Low => self.urls.low.as_deref(),
            Quality::Medium => self.urls.medium.as_deref(),
            Quality::High => self.urls.high.as_deref(),
        };
        preferred.or(self.url.as_deref())
    }

    /// Extension of the stored file
    ///
    /// A remote extension that is not plain ASCII alphanumerics is ignored in
    /// favour of the default for the kind.
    pub fn file_extension(&self) -> &str {
        let remote = self
            .extension
            .as_deref()
            .map(|e| e.trim_start_matches('.'))
            .filter(|e| !e.is_empty() && e.bytes().all(|b| b.is_ascii_alphanumeric()));
        if let Some(ext) = remote {
            return ext;
        }
        match self.id.kind {
            ContentKind::Video => "mp4",
            ContentKind::Document => "bin",
            ContentKind::Course | ContentKind::Lesson => "json",
        }
    }

    /// Serialized metadata for items without a media url
    pub(crate) fn metadata_bytes(&self) -> Result<Vec<u8>, CatalogError> {
        serde_json::to_vec(self)
            .map_err(|e| CatalogError::Rejected(format!("unserializable descriptor: {}", e)))
    }
}

/// Acknowledgment of a delivered mutation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationAck {
    /// Server-side identifier of the applied mutation, if any
    #[serde(default)]
    pub id: Option<String>,
}

/// Read access to remote content plus the mutation sync endpoint
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// Fetch the descriptor for one content item
    async fn fetch_content_descriptor(
        &self,
        id: &ContentId,
    ) -> Result<ContentDescriptor, CatalogError>;

    /// Open the byte stream for an item at the requested quality
    async fn open_byte_stream(
        &self,
        descriptor: &ContentDescriptor,
        quality: Quality,
    ) -> Result<ByteStream, CatalogError>;

    /// Deliver one queued mutation
    async fn submit_mutation(
        &self,
        payload: &serde_json::Value,
    ) -> Result<MutationAck, CatalogError>;

    /// Fetch the thumbnail image of an item, if it has one
    async fn fetch_thumbnail(
        &self,
        descriptor: &ContentDescriptor,
    ) -> Result<Option<Vec<u8>>, CatalogError> {
        let _ = descriptor;
        Ok(None)
    }
}
