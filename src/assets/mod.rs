//! Downloading finished renders and assembling them into animations
//!
//! Fetching goes through [`AssetFetcher`] so the network can be swapped out
//! in tests; [`AssetAssembler`] fans fetches out concurrently and hands the
//! CPU-bound decode/encode work to the blocking pool.

pub mod assembler;
pub mod fetcher;
pub mod mock;

pub use assembler::{encode_gif, AssetAssembler};
pub use fetcher::HttpAssetFetcher;
pub use mock::MockAssetFetcher;

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationOptions {
    pub frame_duration: Duration,
}

impl Default for AnimationOptions {
    fn default() -> Self {
        Self {
            frame_duration: Duration::from_millis(400),
        }
    }
}
