//! Backend API abstraction
//!
//! Every backend endpoint the client consumes goes through `TaskApi`.
//! `HttpTaskApi` is the reqwest implementation; tests substitute an
//! in-memory one.

pub mod http;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use http::HttpTaskApi;

use crate::batch::TaskSubmission;
use crate::error::{ClientError, Result, FFMPEG_NOT_AVAILABLE};
use crate::task::{Task, TaskId};

/// Provider status string for a finished video job
pub const VIDEO_SUCCEEDED: &str = "Succeed";

/// Backend API trait
#[async_trait::async_trait]
pub trait TaskApi: Send + Sync {
    /// `POST /api/test_api_key`
    async fn test_api_key(&self, api_key: &str) -> Result<ApiKeyCheck>;

    /// `POST /api/tasks` as multipart form data
    async fn create_task(&self, submission: &TaskSubmission) -> Result<TaskId>;

    /// `GET /api/tasks`
    async fn list_tasks(&self) -> Result<Vec<Task>>;

    /// `GET /api/tasks/{id}`
    async fn get_task(&self, id: &TaskId) -> Result<Task>;

    /// `DELETE /api/tasks/{id}`
    async fn delete_task(&self, id: &TaskId) -> Result<ActionMessage>;

    /// `GET /api/tasks/{id}/check_video`, true when the task was updated
    async fn check_task_video(&self, id: &TaskId) -> Result<bool>;

    /// `POST /api/check_video_status`
    async fn check_video_status(&self, request_id: &str, api_key: &str) -> Result<VideoStatus>;

    /// `POST /api/tasks/{id}/update_video`
    async fn update_video(&self, id: &TaskId, video_url: &str) -> Result<()>;

    /// `POST /api/tasks/{id}/regenerate`
    async fn regenerate(&self, id: &TaskId, api_key: &str) -> Result<ActionMessage>;

    /// `POST /api/tasks/{id}/regenerate_from_last_frame`
    async fn regenerate_from_last_frame(
        &self,
        id: &TaskId,
        api_key: &str,
        prompt: Option<&str>,
    ) -> Result<ActionMessage>;

    /// `GET /api/tasks/{id}/open_folder?type=`
    async fn open_folder(&self, id: &TaskId, kind: FolderKind) -> Result<ActionMessage>;

    /// `GET /api/tasks/check_all_videos`
    async fn check_all_videos(&self) -> Result<CheckAllReport>;

    /// `POST /api/merge_videos`. A missing merge tool is reported as
    /// `ClientError::FeatureUnavailable`.
    async fn merge_videos(&self, task_ids: &[TaskId], api_key: &str) -> Result<ActionMessage>;
}

/// Result of validating an API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyCheck {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Generic `{message}` style response of the mutating endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMessage {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    /// New task created by regenerate / merge
    #[serde(default)]
    pub task_id: Option<TaskId>,
}

impl ActionMessage {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message.as_deref().unwrap_or(fallback)
    }
}

/// Provider video status as relayed by `POST /api/check_video_status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub results: Option<VideoResults>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoResults {
    #[serde(default)]
    pub videos: Vec<VideoOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoOutput {
    #[serde(default)]
    pub url: Option<String>,
}

impl VideoStatus {
    pub fn succeeded(url: impl Into<String>) -> Self {
        Self {
            status: Some(VIDEO_SUCCEEDED.to_string()),
            reason: None,
            results: Some(VideoResults {
                videos: vec![VideoOutput {
                    url: Some(url.into()),
                }],
            }),
        }
    }

    pub fn in_progress() -> Self {
        Self {
            status: Some("InProgress".to_string()),
            ..Self::default()
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status.as_deref() == Some(VIDEO_SUCCEEDED)
    }

    /// URL of the first generated video, when the job succeeded.
    pub fn video_url(&self) -> Option<&str> {
        if !self.is_succeeded() {
            return None;
        }
        self.results
            .as_ref()?
            .videos
            .first()?
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
    }
}

/// Response of the bulk video check
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CheckAllReport {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub updated_tasks: Vec<serde_json::Value>,
}

/// Which folder `open_folder` should reveal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FolderKind {
    #[default]
    Auto,
    Image,
    Video,
}

impl FolderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for FolderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON error body `{error, code}`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Map a failed response body to the error taxonomy.
pub(crate) fn error_from_body(status: u16, body: &str) -> ClientError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .or(parsed.message)
        .unwrap_or_else(|| body.trim().to_string());

    match parsed.code {
        Some(code) if code == FFMPEG_NOT_AVAILABLE => {
            ClientError::FeatureUnavailable { code, message }
        }
        _ => ClientError::Http { status, message },
    }
}

/// Parse a body, reporting a short excerpt of it on failure.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        let snippet: String = body.chars().take(120).collect();
        ClientError::Decode(format!("{e} in `{snippet}`"))
    })
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Read a key check. The backend answers `{success, message}` on its
/// failure statuses as well, so the body decides before the status does.
pub(crate) fn key_check_from_response(status: u16, body: &str) -> Result<ApiKeyCheck> {
    match decode::<ApiKeyCheck>(body) {
        Ok(check) => Ok(check),
        Err(_) if !is_success(status) => Err(error_from_body(status, body)),
        Err(e) => Err(e),
    }
}

/// Read a merge response. A missing merge tool comes back with a 200 on the
/// capability check and a 400 otherwise; both map to `FeatureUnavailable`.
pub(crate) fn merge_from_response(status: u16, body: &str) -> Result<ActionMessage> {
    let flags: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    if flags.code.as_deref() == Some(FFMPEG_NOT_AVAILABLE) || !is_success(status) {
        return Err(error_from_body(status, body));
    }
    if let Some(error) = flags.error {
        return Err(ClientError::Http {
            status,
            message: error,
        });
    }
    decode(body)
}
