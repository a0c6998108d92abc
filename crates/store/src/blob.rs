//! HTTP-backed blob store.
//!
//! Media references resolve to URLs under a base endpoint (the bot's file
//! gateway). Fetch failures are transient and abort only the current item.

use async_trait::async_trait;
use reqwest::Client;

use dejavu_core::{Error, MediaRef, Result};

use crate::BlobStore;

/// Blob store fetching payloads over HTTP.
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
}

impl HttpBlobStore {
    /// Create a blob store rooted at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url_for(&self, media: &MediaRef) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), media.0)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch(&self, media: &MediaRef) -> Result<Vec<u8>> {
        let url = self.url_for(media);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Blob(format!("fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::Blob(format!(
                "fetch {}: status {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Blob(format!("read body {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}
