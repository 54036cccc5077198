//! Polling state machine for a submitted task
//!
//! A [`Poller`] walks `Submitted -> Polling -> {Done, TimedOut, Failed,
//! Cancelled}`. It waits one interval before every status check and charges
//! that interval against the timeout budget; when the budget reaches zero
//! without a finished task it reports [`Error::Timeout`].

use crate::models::Task;
use crate::task::TaskService;
use crate::{Error, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Extra context carried into the timeout error.
    pub timeout_message: String,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(3),
            timeout_message: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling,
    Done,
    TimedOut,
    Failed,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollState::Done | PollState::TimedOut | PollState::Failed | PollState::Cancelled
        )
    }
}

pub struct Poller {
    settings: PollSettings,
    cancellation: CancellationToken,
    state: PollState,
    polls: usize,
}

impl Poller {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            settings,
            cancellation: CancellationToken::new(),
            state: PollState::Submitted,
            polls: 0,
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Status checks issued so far.
    pub fn poll_count(&self) -> usize {
        self.polls
    }

    fn transition(&mut self, task_id: &str, next: PollState) {
        debug!("Task {}: {:?} -> {:?}", task_id, self.state, next);
        self.state = next;
    }

    /// Poll `task_id` until it is done, the budget runs out, a check fails,
    /// or the cancellation token fires.
    pub async fn run(&mut self, tasks: &dyn TaskService, task_id: &str) -> Result<Task> {
        if self.state.is_terminal() {
            return Err(Error::Invariant(format!(
                "Poller for task {} already finished in state {:?}",
                task_id, self.state
            )));
        }

        let interval = self.settings.poll_interval;
        if interval.is_zero() {
            return Err(Error::Config("Poll interval must be non-zero".to_string()));
        }

        self.transition(task_id, PollState::Polling);

        let cancellation = self.cancellation.clone();
        let mut remaining = self.settings.timeout;
        let mut waited = Duration::ZERO;

        while !remaining.is_zero() {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(self.cancel(task_id)),
                _ = tokio::time::sleep(interval) => {}
            }
            remaining = remaining.saturating_sub(interval);
            waited += interval;
            self.polls += 1;

            let checked = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(self.cancel(task_id)),
                checked = tasks.check_task(task_id) => checked,
            };

            let task = match checked {
                Ok(task) => task,
                Err(e) => {
                    self.transition(task_id, PollState::Failed);
                    return Err(e);
                }
            };

            debug!(
                "Task {} poll #{}: state={} photos={} ({:?} budget left)",
                task_id,
                self.polls,
                task.state,
                task.photo_url_list.len(),
                remaining
            );

            if task.is_done() {
                self.transition(task_id, PollState::Done);
                return Ok(task);
            }
        }

        self.transition(task_id, PollState::TimedOut);
        warn!(
            "Task {} not finished after {} polls ({:?})",
            task_id, self.polls, waited
        );
        Err(Error::Timeout {
            task_id: task_id.to_string(),
            waited,
            message: self.settings.timeout_message.clone(),
        })
    }

    fn cancel(&mut self, task_id: &str) -> Error {
        self.transition(task_id, PollState::Cancelled);
        Error::Cancelled {
            task_id: Some(task_id.to_string()),
        }
    }
}
