//! Bearer-token acquisition for the Dream API
//!
//! A [`TokenSource`] performs one full refresh. [`TokenProvider`] sits in
//! front of it and reuses each token for a bounded number of calls.

pub mod client;
pub mod mock;

pub use client::DreamTokenSource;
pub use mock::MockTokenSource;

use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Obtain a brand new bearer token.
    async fn fetch_token(&self) -> Result<String>;
}

struct Token {
    value: String,
    uses_remaining: u32,
}

/// Caching front for a [`TokenSource`].
///
/// Each token serves `max_uses` calls to [`TokenProvider::get_token`]; the
/// next call refreshes. The cache lock is held across the refresh, so
/// concurrent callers wait for the in-flight refresh instead of starting
/// their own.
pub struct TokenProvider {
    source: Box<dyn TokenSource>,
    cached: Mutex<Option<Token>>,
    max_uses: u32,
    refreshes: AtomicUsize,
}

impl TokenProvider {
    pub fn new(source: Box<dyn TokenSource>, max_uses: u32) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
            max_uses: max_uses.max(1),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub async fn get_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_mut() {
            if token.uses_remaining > 0 {
                token.uses_remaining -= 1;
                tracing::debug!(
                    "Reusing cached token ({} uses left)",
                    token.uses_remaining
                );
                return Ok(token.value.clone());
            }
        }

        *cached = None;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Refreshing bearer token");

        let value = self.source.fetch_token().await?;
        *cached = Some(Token {
            value: value.clone(),
            uses_remaining: self.max_uses - 1,
        });

        Ok(value)
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Number of refresh attempts so far, failed ones included.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn max_uses(&self) -> u32 {
        self.max_uses
    }
}
