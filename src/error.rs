//! Error handling and custom error types
//!
//! Provides unified error handling across the client using thiserror. Each
//! stage of a generation (auth, submission, polling, assembly) has its own
//! variant so callers can tell where a run failed.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authorization error: {0}")]
    Auth(String),

    #[error("Task submission error: {0}")]
    Submission(String),

    #[error("Task poll error: {0}")]
    Poll(String),

    #[error("Task {task_id} did not complete within {waited:?}{}", display_message(.message))]
    Timeout {
        task_id: String,
        waited: Duration,
        message: String,
    },

    /// `task_id` is `None` when cancellation arrived before submission.
    #[error("Generation was cancelled{}", display_task(.task_id))]
    Cancelled { task_id: Option<String> },

    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Image encoding error: {0}")]
    Encode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

fn display_message(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {}", message)
    }
}

fn display_task(task_id: &Option<String>) -> String {
    match task_id {
        Some(id) => format!(" (task {})", id),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
