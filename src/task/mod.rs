//! Task submission and status checks against the Dream paint API

pub mod client;
pub mod mock;

pub use client::TaskClient;
pub use mock::MockTaskClient;

use crate::models::{GenerationRequest, Task};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait TaskService: Send + Sync {
    /// Submit a generation request. Fails with `Error::Submission`.
    async fn create_task(&self, request: &GenerationRequest, token: &str) -> Result<Task>;

    /// Fetch the latest snapshot of a task. Fails with `Error::Poll`.
    async fn check_task(&self, task_id: &str) -> Result<Task>;
}
