//! Task records as the backend reports them.
//!
//! The client only reads these; every mutation goes through a backend endpoint.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Model shown in the detail view when the backend omits one.
pub const DEFAULT_MODEL: &str = "Wan-AI/Wan2.1-I2V-14B-720P";

/// Task identifier. The backend sends either a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => TaskId(text),
            RawId::Number(n) => TaskId(n.to_string()),
        })
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for TaskId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    ProcessingImage,
    RefiningPrompt,
    GeneratingVideo,
    WaitingForVideo,
    ExtendingVideo,
    MergingVideos,
    Completed,
    CompletedWithWarning,
    Failed,
    /// Status string this client does not know, kept verbatim
    Other(String),
}

/// Display tone for a status badge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Success,
    Danger,
    Warning,
    Secondary,
    Info,
}

impl TaskStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "processing_image" => Self::ProcessingImage,
            "refining_prompt" => Self::RefiningPrompt,
            "generating_video" => Self::GeneratingVideo,
            "waiting_for_video" => Self::WaitingForVideo,
            "extending_video" => Self::ExtendingVideo,
            "merging_videos" => Self::MergingVideos,
            "completed" => Self::Completed,
            "completed_with_warning" => Self::CompletedWithWarning,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::ProcessingImage => "processing_image",
            Self::RefiningPrompt => "refining_prompt",
            Self::GeneratingVideo => "generating_video",
            Self::WaitingForVideo => "waiting_for_video",
            Self::ExtendingVideo => "extending_video",
            Self::MergingVideos => "merging_videos",
            Self::Completed => "completed",
            Self::CompletedWithWarning => "completed_with_warning",
            Self::Failed => "failed",
            Self::Other(raw) => raw,
        }
    }

    /// Human readable label; unknown statuses show their raw string.
    pub fn label(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::ProcessingImage => "Processing image",
            Self::RefiningPrompt => "Refining prompt",
            Self::GeneratingVideo => "Generating video",
            Self::WaitingForVideo => "Waiting for video",
            Self::ExtendingVideo => "Extending video",
            Self::MergingVideos => "Merging videos",
            Self::Completed => "Completed",
            Self::CompletedWithWarning => "Completed with warning",
            Self::Failed => "Failed",
            Self::Other(raw) => raw,
        }
    }

    pub fn tone(&self) -> StatusTone {
        match self {
            Self::Completed => StatusTone::Success,
            Self::Failed => StatusTone::Danger,
            Self::CompletedWithWarning => StatusTone::Warning,
            Self::Pending => StatusTone::Secondary,
            _ => StatusTone::Info,
        }
    }

    /// Statuses that carry a finished video.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithWarning)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithWarning | Self::Failed
        )
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub parent_task_id: Option<TaskId>,
    /// Provider job handle, set once the video request was accepted
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub video_path: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub vlm_model: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl Task {
    pub fn new(id: impl Into<TaskId>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            status,
            message: None,
            created_at: None,
            updated_at: None,
            parent_task_id: None,
            request_id: None,
            image_path: None,
            video_path: None,
            prompt: None,
            model: None,
            vlm_model: None,
            llm_model: None,
            prompt_template: None,
        }
    }

    pub fn parent_id(&self) -> Option<&TaskId> {
        self.parent_task_id.as_ref().filter(|id| !id.0.is_empty())
    }

    pub fn request_id(&self) -> Option<&str> {
        non_empty(&self.request_id)
    }

    pub fn video_path(&self) -> Option<&str> {
        non_empty(&self.video_path)
    }

    pub fn image_path(&self) -> Option<&str> {
        non_empty(&self.image_path)
    }

    pub fn has_video(&self) -> bool {
        self.video_path().is_some()
    }

    /// A provider job is outstanding: request submitted, no video stored yet,
    /// and the task has not reached `completed` or `failed`.
    pub fn needs_status_check(&self) -> bool {
        self.request_id().is_some()
            && self.video_path().is_none()
            && !matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Completed tasks must carry a video.
    pub fn is_consistent(&self) -> bool {
        !self.status.is_completed() || self.has_video()
    }

    /// Model name with the default applied, last path segment only.
    pub fn short_model_name(&self) -> &str {
        let model = non_empty(&self.model).unwrap_or(DEFAULT_MODEL);
        model.rsplit('/').next().unwrap_or(model)
    }
}

/// Format a backend timestamp as `YYYY-MM-DD HH:MM:SS`, or return it as-is
/// when it does not parse.
pub fn format_timestamp(raw: &str) -> String {
    use chrono::{DateTime, Local, NaiveDateTime};

    const OUT: &str = "%Y-%m-%d %H:%M:%S";

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Local).format(OUT).to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, pattern) {
            return ts.format(OUT).to_string();
        }
    }
    raw.to_string()
}
