//! Data models and structures
//!
//! Defines the task and request shapes exchanged with the Dream API, the
//! endpoint set, and environment-driven configuration.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Prompts longer than this many characters are cut before submission.
pub const MAX_PROMPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskState {
    Pending,
    Generating,
    Completed,
    Failed,
    Other(String),
}

impl Default for TaskState {
    fn default() -> Self {
        TaskState::Other(String::new())
    }
}

impl From<String> for TaskState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => TaskState::Pending,
            "generating" => TaskState::Generating,
            "completed" => TaskState::Completed,
            "failed" => TaskState::Failed,
            _ => TaskState::Other(value),
        }
    }
}

impl From<TaskState> for String {
    fn from(state: TaskState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => f.write_str("pending"),
            TaskState::Generating => f.write_str("generating"),
            TaskState::Completed => f.write_str("completed"),
            TaskState::Failed => f.write_str("failed"),
            TaskState::Other(s) => f.write_str(s),
        }
    }
}

/// Server-side snapshot of a generation task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub photo_url_list: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Task {
    pub fn has_photos(&self) -> bool {
        !self.photo_url_list.is_empty()
    }

    /// A task is done only once it has photos *and* has left the generating
    /// state. Either condition alone is not enough.
    pub fn is_done(&self) -> bool {
        self.has_photos() && self.state != TaskState::Generating
    }

    /// The last URL in the list is the final render.
    pub fn final_photo_url(&self) -> Option<&str> {
        self.photo_url_list.last().map(String::as_str)
    }
}

/// Rendering style identifier understood by the Dream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Style(pub u32);

impl Default for Style {
    fn default() -> Self {
        Style(84)
    }
}

impl From<u32> for Style {
    fn from(value: u32) -> Self {
        Style(value)
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    style: Style,
}

impl GenerationRequest {
    pub fn new(prompt: &str, style: Style) -> Self {
        Self {
            prompt: prompt.chars().take(MAX_PROMPT_CHARS).collect(),
            style,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn style(&self) -> Style {
        self.style
    }
}

// Dream API wire payloads. Field order is significant: the service expects
// `is_premium` first and `display_freq` last.
#[derive(Debug, Serialize)]
pub(crate) struct CreateTaskBody<'a> {
    pub is_premium: bool,
    pub input_spec: InputSpec<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InputSpec<'a> {
    pub prompt: &'a str,
    pub style: u32,
    pub display_freq: u32,
}

impl<'a> From<&'a GenerationRequest> for CreateTaskBody<'a> {
    fn from(request: &'a GenerationRequest) -> Self {
        Self {
            is_premium: false,
            input_spec: InputSpec {
                prompt: request.prompt(),
                style: request.style().0,
                display_freq: 10,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignUpRequest {
    pub return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignUpResponse {
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Page whose HTML references the `_app-<hash>.js` bundle.
    pub discovery_url: String,
    pub script_base_url: String,
    pub auth_url: String,
    pub tasks_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            discovery_url: "https://dream.ai/create".to_string(),
            script_base_url: "https://dream.ai/_next/static/chunks/pages".to_string(),
            auth_url: "https://identitytoolkit.googleapis.com/v1/accounts:signUp".to_string(),
            tasks_url: "https://paint.api.wombo.ai/api/v2/tasks".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint at a single host, keeping production paths.
    /// Used to aim the client at a local mock server.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            discovery_url: format!("{}/create", base),
            script_base_url: format!("{}/_next/static/chunks/pages", base),
            auth_url: format!("{}/v1/accounts:signUp", base),
            tasks_url: format!("{}/api/v2/tasks", base),
        }
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoints: Endpoints,
    pub max_uses_per_token: u32,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub frame_duration: Duration,
    pub max_concurrent_fetches: usize,
    pub timeout_message: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            max_uses_per_token: 2,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(3),
            frame_duration: Duration::from_millis(400),
            max_concurrent_fetches: 8,
            timeout_message: String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        accept_missing_dotenv(dotenvy::dotenv())?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup. Unset variables
    /// fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let endpoints = Endpoints {
            discovery_url: lookup("DREAM_DISCOVERY_URL")
                .unwrap_or(defaults.endpoints.discovery_url),
            script_base_url: lookup("DREAM_SCRIPT_BASE_URL")
                .unwrap_or(defaults.endpoints.script_base_url),
            auth_url: lookup("DREAM_AUTH_URL").unwrap_or(defaults.endpoints.auth_url),
            tasks_url: lookup("DREAM_TASKS_URL").unwrap_or(defaults.endpoints.tasks_url),
        };

        let max_uses_per_token: u32 =
            parse_var(&lookup, "DREAM_MAX_USES_PER_TOKEN", defaults.max_uses_per_token)?;
        let timeout_secs: u64 =
            parse_var(&lookup, "DREAM_TIMEOUT_SECS", defaults.timeout.as_secs())?;
        let poll_interval_secs: u64 = parse_var(
            &lookup,
            "DREAM_POLL_INTERVAL_SECS",
            defaults.poll_interval.as_secs(),
        )?;
        let frame_ms: u64 = parse_var(
            &lookup,
            "DREAM_FRAME_DURATION_MS",
            defaults.frame_duration.as_millis() as u64,
        )?;
        let max_concurrent_fetches: usize = parse_var(
            &lookup,
            "DREAM_MAX_CONCURRENT_FETCHES",
            defaults.max_concurrent_fetches,
        )?;

        Ok(Self {
            endpoints,
            max_uses_per_token: max_uses_per_token.max(1),
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_secs(poll_interval_secs),
            frame_duration: Duration::from_millis(frame_ms),
            max_concurrent_fetches: max_concurrent_fetches.max(1),
            timeout_message: lookup("DREAM_TIMEOUT_MESSAGE").unwrap_or_default(),
        })
    }
}

/// A missing `.env` is fine; an unreadable or malformed one is not.
fn accept_missing_dotenv<T>(loaded: std::result::Result<T, dotenvy::Error>) -> Result<()> {
    match loaded {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
