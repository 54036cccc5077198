use super::AssetFetcher;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpAssetFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpAssetFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: FETCH_TIMEOUT,
        }
    }

    /// Bound on a single download, body included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn fetch_error(url: &str, reason: String) -> Error {
    Error::Fetch {
        url: url.to_string(),
        reason,
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).timeout(self.timeout).send().await.map_err(|e| {
            tracing::error!("Failed to fetch image {}: {}", url, e);
            fetch_error(url, e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!("Image fetch error (status {}): {}", status, url);
            return Err(fetch_error(url, format!("status {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(url, format!("failed to read body: {}", e)))?;

        tracing::debug!("Fetched {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }
}
