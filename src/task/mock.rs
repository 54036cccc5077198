use super::TaskService;
use crate::models::{GenerationRequest, Task, TaskState};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

enum CheckResponse {
    Snapshot(Task),
    Failure(String),
}

/// Scripted task service.
///
/// Check responses are served in order; once the script runs out the last
/// one repeats. With no script every check reports a generating task.
#[derive(Clone)]
pub struct MockTaskClient {
    task_id: String,
    fail_submission: bool,
    checks: Arc<Mutex<VecDeque<CheckResponse>>>,
    last_check: Arc<Mutex<Option<Task>>>,
    submitted: Arc<Mutex<Vec<(GenerationRequest, String)>>>,
    check_count: Arc<Mutex<usize>>,
}

impl MockTaskClient {
    pub fn new() -> Self {
        Self {
            task_id: "mock-task".to_string(),
            fail_submission: false,
            checks: Arc::new(Mutex::new(VecDeque::new())),
            last_check: Arc::new(Mutex::new(None)),
            submitted: Arc::new(Mutex::new(Vec::new())),
            check_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_task_id(mut self, task_id: &str) -> Self {
        self.task_id = task_id.to_string();
        self
    }

    pub fn with_submission_failure(mut self) -> Self {
        self.fail_submission = true;
        self
    }

    pub fn with_check_response(self, state: TaskState, photos: &[&str]) -> Self {
        let task = Task {
            id: self.task_id.clone(),
            state,
            photo_url_list: photos.iter().map(|p| p.to_string()).collect(),
        };
        self.checks
            .lock()
            .unwrap()
            .push_back(CheckResponse::Snapshot(task));
        self
    }

    pub fn with_check_failure(self, message: &str) -> Self {
        self.checks
            .lock()
            .unwrap()
            .push_back(CheckResponse::Failure(message.to_string()));
        self
    }

    pub fn get_check_count(&self) -> usize {
        *self.check_count.lock().unwrap()
    }

    /// Requests and tokens passed to `create_task`, in call order.
    pub fn get_submissions(&self) -> Vec<(GenerationRequest, String)> {
        self.submitted.lock().unwrap().clone()
    }

    fn pending_task(&self) -> Task {
        Task {
            id: self.task_id.clone(),
            state: TaskState::Pending,
            photo_url_list: Vec::new(),
        }
    }
}

impl Default for MockTaskClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskService for MockTaskClient {
    async fn create_task(&self, request: &GenerationRequest, token: &str) -> Result<Task> {
        self.submitted
            .lock()
            .unwrap()
            .push((request.clone(), token.to_string()));

        if self.fail_submission {
            return Err(Error::Submission("Mock submission failure".to_string()));
        }
        Ok(self.pending_task())
    }

    async fn check_task(&self, task_id: &str) -> Result<Task> {
        *self.check_count.lock().unwrap() += 1;

        let next = self.checks.lock().unwrap().pop_front();
        let mut last = self.last_check.lock().unwrap();
        match next {
            Some(CheckResponse::Failure(message)) => Err(Error::Poll(message)),
            Some(CheckResponse::Snapshot(mut task)) => {
                task.id = task_id.to_string();
                *last = Some(task.clone());
                Ok(task)
            }
            None => Ok(last.clone().unwrap_or_else(|| Task {
                id: task_id.to_string(),
                state: TaskState::Generating,
                photo_url_list: Vec::new(),
            })),
        }
    }
}
