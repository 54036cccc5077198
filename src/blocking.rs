//! Blocking facade over [`DreamService`]
//!
//! Owns a current-thread runtime and drives the async service to completion
//! on the calling thread, so poll waits block the caller. Must not be built
//! or used from inside an async runtime.

use crate::assets::AnimationOptions;
use crate::dream::{DreamService, GenerateOptions};
use crate::models::{Config, Style, Task};
use crate::{Error, Result};
use tokio::runtime::{Builder, Handle, Runtime};

pub struct BlockingDreamService {
    inner: DreamService,
    runtime: Runtime,
}

impl BlockingDreamService {
    pub fn new(config: &Config) -> Result<Self> {
        Self::from_service(DreamService::new(config)?)
    }

    pub fn from_service(inner: DreamService) -> Result<Self> {
        if Handle::try_current().is_ok() {
            return Err(Error::Config(
                "BlockingDreamService cannot be used inside an async runtime; use DreamService"
                    .to_string(),
            ));
        }

        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    pub fn generate_task(
        &self,
        prompt: &str,
        style: Style,
        options: &GenerateOptions,
    ) -> Result<Task> {
        self.runtime
            .block_on(self.inner.generate_task(prompt, style, options))
    }

    pub fn generate_image(
        &self,
        prompt: &str,
        style: Style,
        options: &GenerateOptions,
    ) -> Result<Vec<u8>> {
        self.runtime
            .block_on(self.inner.generate_image(prompt, style, options))
    }

    pub fn generate_animation(
        &self,
        prompt: &str,
        style: Style,
        options: &GenerateOptions,
        animation: AnimationOptions,
    ) -> Result<Vec<u8>> {
        self.runtime.block_on(
            self.inner
                .generate_animation(prompt, style, options, animation),
        )
    }

    pub fn assemble_animation(
        &self,
        urls: &[String],
        animation: AnimationOptions,
    ) -> Result<Vec<u8>> {
        self.runtime
            .block_on(self.inner.assemble_animation(urls, animation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MockAssetFetcher;
    use crate::auth::MockTokenSource;
    use crate::dream::DreamServices;
    use crate::models::TaskState;
    use crate::task::MockTaskClient;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn service(tasks: MockTaskClient, fetcher: MockAssetFetcher) -> DreamService {
        DreamService::with_services(
            DreamServices {
                token_source: Box::new(MockTokenSource::new()),
                tasks: Box::new(tasks),
                fetcher: Arc::new(fetcher),
            },
            &Config::default(),
        )
    }

    fn options(timeout_ms: u64, interval_ms: u64) -> GenerateOptions {
        GenerateOptions {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(interval_ms),
            cancellation: None,
        }
    }

    #[test]
    fn test_blocking_generate_image() {
        let tasks = MockTaskClient::new()
            .with_check_response(TaskState::Generating, &[])
            .with_check_response(TaskState::Completed, &["u1", "u2"]);
        let fetcher = MockAssetFetcher::new().with_asset("u2", vec![7, 7]);
        let blocking = BlockingDreamService::from_service(service(tasks, fetcher)).unwrap();

        let start = Instant::now();
        let bytes = blocking
            .generate_image("a red fox", Style(84), &options(1_000, 20))
            .unwrap();

        assert_eq!(bytes, vec![7, 7]);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_blocking_timeout() {
        let tasks = MockTaskClient::new();
        let task_probe = tasks.clone();
        let blocking =
            BlockingDreamService::from_service(service(tasks, MockAssetFetcher::new())).unwrap();

        let err = blocking
            .generate_task("p", Style::default(), &options(60, 30))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(task_probe.get_check_count(), 2);
    }

    #[tokio::test]
    async fn test_rejected_inside_runtime() {
        let result = BlockingDreamService::from_service(service(
            MockTaskClient::new(),
            MockAssetFetcher::new(),
        ));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
