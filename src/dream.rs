//! Generation orchestration: token, submission, polling, download.

use crate::assets::{AnimationOptions, AssetAssembler, AssetFetcher, HttpAssetFetcher};
use crate::auth::{DreamTokenSource, TokenProvider, TokenSource};
use crate::models::{Config, GenerationRequest, Style, Task};
use crate::poller::{PollSettings, Poller};
use crate::task::{TaskClient, TaskService};
use crate::{http, Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Per-call polling options.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Aborts whichever step is in flight when fired: token exchange,
    /// submission, polling or download. The call then fails with
    /// `Error::Cancelled`.
    pub cancellation: Option<CancellationToken>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        let settings = PollSettings::default();
        Self {
            timeout: settings.timeout,
            poll_interval: settings.poll_interval,
            cancellation: None,
        }
    }
}

impl GenerateOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.timeout,
            poll_interval: config.poll_interval,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }
}

/// Run `work` unless the caller's token fires first. Dropping `work` aborts
/// any request it has in flight.
async fn cancellable<T, F>(
    options: &GenerateOptions,
    task_id: Option<&str>,
    work: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(cancellation) = &options.cancellation else {
        return work.await;
    };

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => {
            warn!("Generation cancelled (task {})", task_id.unwrap_or("not submitted"));
            Err(Error::Cancelled {
                task_id: task_id.map(str::to_string),
            })
        }
        result = work => result,
    }
}

/// Injectable service bundle used to construct [`DreamService`] in tests.
pub struct DreamServices {
    pub token_source: Box<dyn TokenSource>,
    pub tasks: Box<dyn TaskService>,
    pub fetcher: Arc<dyn AssetFetcher>,
}

pub struct DreamService {
    tokens: TokenProvider,
    tasks: Box<dyn TaskService>,
    assets: AssetAssembler,
    timeout_message: String,
}

impl DreamService {
    /// Build a service from concrete dependencies.
    pub fn with_services(services: DreamServices, config: &Config) -> Self {
        Self {
            tokens: TokenProvider::new(services.token_source, config.max_uses_per_token),
            tasks: services.tasks,
            assets: AssetAssembler::new(services.fetcher, config.max_concurrent_fetches),
            timeout_message: config.timeout_message.clone(),
        }
    }

    /// Build a service that talks to the endpoints in `config`.
    pub fn new(config: &Config) -> Result<Self> {
        // One connection pool shared by every component.
        let client = http::build_client()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_services(
            DreamServices {
                token_source: Box::new(DreamTokenSource::new(
                    client.clone(),
                    config.endpoints.clone(),
                )),
                tasks: Box::new(TaskClient::new(
                    client.clone(),
                    config.endpoints.tasks_url.clone(),
                )),
                fetcher: Arc::new(HttpAssetFetcher::new(client)),
            },
            config,
        ))
    }

    pub fn token_provider(&self) -> &TokenProvider {
        &self.tokens
    }

    /// Submit a prompt and wait for the finished task without downloading
    /// anything.
    pub async fn generate_task(
        &self,
        prompt: &str,
        style: Style,
        options: &GenerateOptions,
    ) -> Result<Task> {
        let request = GenerationRequest::new(prompt, style);
        let token = cancellable(options, None, self.tokens.get_token()).await?;
        let task =
            cancellable(options, None, self.tasks.create_task(&request, &token)).await?;
        info!("Submitted task {} (style {})", task.id, style);

        let mut poller = Poller::new(PollSettings {
            timeout: options.timeout,
            poll_interval: options.poll_interval,
            timeout_message: self.timeout_message.clone(),
        });
        if let Some(cancellation) = &options.cancellation {
            poller = poller.with_cancellation(cancellation.clone());
        }

        let finished = poller.run(self.tasks.as_ref(), &task.id).await?;
        info!(
            "Task {} finished with {} photos after {} polls",
            finished.id,
            finished.photo_url_list.len(),
            poller.poll_count()
        );
        Ok(finished)
    }

    /// Generate a still image and return the bytes of the final render.
    pub async fn generate_image(
        &self,
        prompt: &str,
        style: Style,
        options: &GenerateOptions,
    ) -> Result<Vec<u8>> {
        let task = self.generate_task(prompt, style, options).await?;
        cancellable(options, Some(&task.id), self.assets.fetch_single(&task)).await
    }

    /// Generate an image and return every intermediate render as a GIF.
    pub async fn generate_animation(
        &self,
        prompt: &str,
        style: Style,
        options: &GenerateOptions,
        animation: AnimationOptions,
    ) -> Result<Vec<u8>> {
        let task = self.generate_task(prompt, style, options).await?;
        cancellable(
            options,
            Some(&task.id),
            self.assets.assemble_animation(&task.photo_url_list, animation),
        )
        .await
    }

    pub async fn assemble_animation(
        &self,
        urls: &[String],
        animation: AnimationOptions,
    ) -> Result<Vec<u8>> {
        self.assets.assemble_animation(urls, animation).await
    }
}
