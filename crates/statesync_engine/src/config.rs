use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::http::RemoteError;

/// Durable state lives here unless the configuration says otherwise.
pub const DEFAULT_STORAGE_DIR: &str = ".statesync";

/// Connection and timing settings shared by every engine component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub presets_path: String,
    /// Path of the progress stream; `{job_id}` is replaced with the job id.
    pub progress_stream_path: String,
    /// Path of the cancel endpoint; `{job_id}` is replaced with the job id.
    pub cancel_path: String,
    pub csrf_cookie_name: String,
    pub csrf_header_name: String,
    pub debounce_ms: u64,
    pub heartbeat_secs: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Directory for durable state. `None` keeps everything in memory.
    pub storage_dir: Option<PathBuf>,
    /// Session cookies (`name=value`, optionally with attributes) seeded into
    /// the cookie jar for the API origin, e.g. `sessionid=...` and `csrftoken=...`.
    pub cookies: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/".to_string(),
            presets_path: "api/saved-states/".to_string(),
            progress_stream_path: "api/jobs/{job_id}/progress/stream/".to_string(),
            cancel_path: "api/jobs/{job_id}/cancel/".to_string(),
            csrf_cookie_name: "csrftoken".to_string(),
            csrf_header_name: "X-CSRFToken".to_string(),
            debounce_ms: 300,
            heartbeat_secs: 10,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            storage_dir: Some(PathBuf::from(DEFAULT_STORAGE_DIR)),
            cookies: Vec::new(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn progress_stream_path_for(&self, job_id: &str) -> Result<String, RemoteError> {
        Ok(self
            .progress_stream_path
            .replace("{job_id}", &path_segment(job_id)?))
    }

    pub fn cancel_path_for(&self, job_id: &str) -> Result<String, RemoteError> {
        Ok(self.cancel_path.replace("{job_id}", &path_segment(job_id)?))
    }
}

/// Percent-encodes `job_id` so it stays exactly one path segment. Ids that
/// a URL parser would treat as dot segments cannot be expressed and are rejected.
fn path_segment(job_id: &str) -> Result<String, RemoteError> {
    if matches!(job_id, "" | "." | "..") {
        return Err(RemoteError::InvalidUrl(format!("unusable job id {job_id:?}")));
    }
    // Form encoding writes spaces as '+'; a literal '+' comes out as %2B.
    Ok(form_urlencoded::byte_serialize(job_id.as_bytes())
        .collect::<String>()
        .replace('+', "%20"))
}
