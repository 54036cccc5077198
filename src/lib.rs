//! Client for the Dream text-to-image service
//!
//! Obtains a rotating bearer token, submits a generation task, polls it to
//! completion and downloads the result as a still image or an animated GIF
//! of the intermediate renders.

pub mod assets;
pub mod auth;
pub mod blocking;
pub mod dream;
pub mod error;
pub mod http;
pub mod models;
pub mod poller;
pub mod task;

pub use blocking::BlockingDreamService;
pub use dream::{DreamService, DreamServices, GenerateOptions};
pub use error::{Error, Result};
pub use models::{Config, Style, Task, TaskState};
