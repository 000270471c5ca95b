//! Media resolver: fetch referenced images and inline them
//!
//! Image references are collected from the recent conversation window in
//! message order (duplicates kept), fetched concurrently, base64-encoded and
//! tagged with a fixed MIME type. A failed fetch drops that one image; it
//! never fails the pipeline.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::join_all;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use gardenstate_core::Part;

use super::context::ConversationTurn;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image host returned {status} for {url}")]
    Status { status: u16, url: String },
}

/// Where image bytes come from.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError>;
}

/// Plain HTTP(S) GET, no auth beyond what the URL encodes.
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    client: Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Result<Self, MediaError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Every image reference across `turns`, in order.
pub fn collect_image_refs(turns: &[ConversationTurn]) -> Vec<String> {
    turns.iter().flat_map(|t| t.images.iter().cloned()).collect()
}

/// Fetch all references concurrently and return the successful ones as
/// inline parts, preserving reference order.
pub async fn resolve_images(
    source: &dyn ImageSource,
    refs: &[String],
    mime_type: &str,
) -> Vec<Part> {
    let fetches = refs.iter().map(|url| async move { (url, source.fetch(url).await) });

    join_all(fetches)
        .await
        .into_iter()
        .filter_map(|(url, result)| match result {
            Ok(bytes) => Some(Part::InlineData {
                mime_type: mime_type.to_string(),
                data: STANDARD.encode(bytes),
            }),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Image fetch failed, omitting from request");
                None
            }
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
