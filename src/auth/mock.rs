use super::TokenSource;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Token source that hands out `token-1`, `token-2`, ... and records how
/// many refreshes ran and how many overlapped.
#[derive(Clone)]
pub struct MockTokenSource {
    call_count: Arc<Mutex<usize>>,
    failures_remaining: Arc<Mutex<usize>>,
    in_flight: Arc<Mutex<usize>>,
    max_in_flight: Arc<Mutex<usize>>,
    delay: Duration,
}

impl MockTokenSource {
    pub fn new() -> Self {
        Self {
            call_count: Arc::new(Mutex::new(0)),
            failures_remaining: Arc::new(Mutex::new(0)),
            in_flight: Arc::new(Mutex::new(0)),
            max_in_flight: Arc::new(Mutex::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Fail the next `count` refreshes with an auth error.
    pub fn with_failures(self, count: usize) -> Self {
        *self.failures_remaining.lock().unwrap() = count;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn max_in_flight(&self) -> usize {
        *self.max_in_flight.lock().unwrap()
    }
}

impl Default for MockTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenSource for MockTokenSource {
    async fn fetch_token(&self) -> Result<String> {
        let call = {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            *count
        };

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            *in_flight += 1;
            let mut max = self.max_in_flight.lock().unwrap();
            *max = (*max).max(*in_flight);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        *self.in_flight.lock().unwrap() -= 1;

        let mut failures = self.failures_remaining.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(Error::Auth("Mock refresh failure".to_string()));
        }

        Ok(format!("token-{}", call))
    }
}
