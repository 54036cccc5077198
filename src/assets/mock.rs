use super::AssetFetcher;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
struct MockAsset {
    bytes: Option<Vec<u8>>,
    delay: Duration,
}

/// In-memory fetcher with per-URL latency and failures.
///
/// Records the order in which fetches finish and how many overlapped, so
/// tests can check ordering and concurrency bounds.
#[derive(Clone)]
pub struct MockAssetFetcher {
    assets: Arc<Mutex<HashMap<String, MockAsset>>>,
    completed: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<Mutex<usize>>,
    max_in_flight: Arc<Mutex<usize>>,
}

impl MockAssetFetcher {
    pub fn new() -> Self {
        Self {
            assets: Arc::new(Mutex::new(HashMap::new())),
            completed: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(Mutex::new(0)),
            max_in_flight: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_asset(self, url: &str, bytes: Vec<u8>) -> Self {
        self.with_delayed_asset(url, bytes, Duration::ZERO)
    }

    pub fn with_delayed_asset(self, url: &str, bytes: Vec<u8>, delay: Duration) -> Self {
        self.assets.lock().unwrap().insert(
            url.to_string(),
            MockAsset {
                bytes: Some(bytes),
                delay,
            },
        );
        self
    }

    pub fn with_failure(self, url: &str, delay: Duration) -> Self {
        self.assets
            .lock()
            .unwrap()
            .insert(url.to_string(), MockAsset { bytes: None, delay });
        self
    }

    /// URLs in the order their fetches finished, failures included.
    pub fn get_completion_order(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        *self.max_in_flight.lock().unwrap()
    }
}

impl Default for MockAssetFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for MockAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let asset = self.assets.lock().unwrap().get(url).cloned();

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            *in_flight += 1;
            let mut max = self.max_in_flight.lock().unwrap();
            *max = (*max).max(*in_flight);
        }

        let delay = asset.as_ref().map(|a| a.delay).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        *self.in_flight.lock().unwrap() -= 1;
        self.completed.lock().unwrap().push(url.to_string());

        match asset.and_then(|a| a.bytes) {
            Some(bytes) => Ok(bytes),
            None => Err(Error::Fetch {
                url: url.to_string(),
                reason: "status 404 Not Found".to_string(),
            }),
        }
    }
}
