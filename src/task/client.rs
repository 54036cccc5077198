use super::TaskService;
use crate::http::{self, ORIGIN, REFERER};
use crate::models::{CreateTaskBody, GenerationRequest, Task};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const CREATE_TIMEOUT: Duration = Duration::from_secs(20);
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TaskClient {
    client: Client,
    tasks_url: String,
}

impl TaskClient {
    pub fn new(client: Client, tasks_url: String) -> Self {
        Self {
            client,
            tasks_url: tasks_url.trim_end_matches('/').to_string(),
        }
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/{}", self.tasks_url, task_id)
    }
}

#[async_trait]
impl TaskService for TaskClient {
    async fn create_task(&self, request: &GenerationRequest, token: &str) -> Result<Task> {
        tracing::debug!(
            "Submitting task (style {}, {} chars)",
            request.style(),
            request.prompt().chars().count()
        );

        let body = serde_json::to_string(&CreateTaskBody::from(request))
            .map_err(|e| Error::Submission(format!("Failed to encode request: {}", e)))?;

        let http_request = self
            .client
            .post(&self.tasks_url)
            .timeout(CREATE_TIMEOUT)
            .header("Authorization", format!("bearer {}", token))
            .header("Content-Type", "text/plain;charset=UTF-8")
            .header("Origin", ORIGIN)
            .header("Referer", REFERER)
            .body(body);

        let text = http::send_for_text(http_request, "task creation")
            .await
            .map_err(Error::Submission)?;

        let task: Task = serde_json::from_str(&text).map_err(|e| {
            tracing::error!("Failed to parse created task: {}\nBody: {}", e, text);
            Error::Submission(format!("Failed to parse created task: {}", e))
        })?;

        tracing::info!("Created task {}", task.id);
        Ok(task)
    }

    async fn check_task(&self, task_id: &str) -> Result<Task> {
        let request = self
            .client
            .get(self.task_url(task_id))
            .timeout(CHECK_TIMEOUT)
            .header("Origin", ORIGIN)
            .header("Referer", REFERER);

        let text = http::send_for_text(request, "task status")
            .await
            .map_err(Error::Poll)?;

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!("Failed to parse task status: {}\nBody: {}", e, text);
            Error::Poll(format!("Failed to parse task status: {}", e))
        })
    }
}
