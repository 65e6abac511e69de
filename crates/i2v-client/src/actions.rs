//! Task detail and action panel
//!
//! Thin wrappers over the mutating endpoints. None of them touch local
//! state beyond the merge capability flag; the next poll picks up changes.

use crate::api::{ActionMessage, CheckAllReport, FolderKind, TaskApi};
use crate::error::{ClientError, Result, FFMPEG_NOT_AVAILABLE};
use crate::selection::MergeSelection;
use crate::task::{Task, TaskId};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Task ids the backend treats as a merge-tool check
pub const MERGE_CHECK_IDS: [&str; 2] = ["test1", "test2"];

/// Whether the backend can merge videos
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MergeCapability {
    #[default]
    Unknown,
    Available,
    Unavailable { message: String },
}

pub struct TaskActions {
    api: Arc<dyn TaskApi>,
    api_key: String,
    merge_capability: Mutex<MergeCapability>,
}

impl TaskActions {
    pub fn new(api: Arc<dyn TaskApi>) -> Self {
        Self {
            api,
            api_key: String::new(),
            merge_capability: Mutex::new(MergeCapability::Unknown),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub async fn detail(&self, id: &TaskId) -> Result<Task> {
        self.api.get_task(id).await
    }

    /// Delete a task and its media. `confirm` runs first; declining sends
    /// nothing.
    pub async fn delete<C>(&self, id: &TaskId, confirm: C) -> Result<ActionMessage>
    where
        C: FnOnce(&TaskId) -> bool,
    {
        if !confirm(id) {
            return Err(ClientError::Cancelled);
        }
        let result = self.api.delete_task(id).await?;
        info!(task_id = %id, "task deleted");
        Ok(result)
    }

    /// Resubmit a task with its stored parameters.
    pub async fn regenerate(&self, id: &TaskId) -> Result<ActionMessage> {
        self.api.regenerate(id, &self.api_key).await
    }

    /// Prompt a last-frame regeneration would carry over, for editing.
    pub async fn carried_prompt(&self, id: &TaskId) -> Result<Option<String>> {
        let task = self.api.get_task(id).await?;
        Ok(task.prompt.filter(|p| !p.trim().is_empty()))
    }

    /// Start a linked task seeded with the final frame of this task's video,
    /// or its source image when there is no video. A blank prompt means the
    /// backend keeps the stored prompt.
    pub async fn regenerate_from_last_frame(
        &self,
        id: &TaskId,
        prompt: Option<&str>,
    ) -> Result<ActionMessage> {
        let prompt = prompt.map(str::trim).filter(|p| !p.is_empty());
        self.api
            .regenerate_from_last_frame(id, &self.api_key, prompt)
            .await
    }

    pub async fn open_folder(&self, id: &TaskId, kind: FolderKind) -> Result<ActionMessage> {
        self.api.open_folder(id, kind).await
    }

    pub async fn check_all_videos(&self) -> Result<CheckAllReport> {
        self.api.check_all_videos().await
    }

    pub fn merge_capability(&self) -> MergeCapability {
        self.merge_capability.lock().clone()
    }

    /// Merge is refused only once the backend said its tool is missing.
    pub fn merge_enabled(&self) -> bool {
        !matches!(
            *self.merge_capability.lock(),
            MergeCapability::Unavailable { .. }
        )
    }

    fn mark_unavailable(&self, message: String) {
        warn!(%message, "video merge unavailable");
        *self.merge_capability.lock() = MergeCapability::Unavailable { message };
    }

    /// Ask the backend whether it can merge. Transport failures leave the
    /// capability unknown.
    pub async fn detect_merge_capability(&self) -> MergeCapability {
        let sentinel: Vec<TaskId> = MERGE_CHECK_IDS.iter().copied().map(TaskId::from).collect();
        match self.api.merge_videos(&sentinel, &self.api_key).await {
            Ok(_) => {
                *self.merge_capability.lock() = MergeCapability::Available;
            }
            Err(ClientError::FeatureUnavailable { message, .. }) => {
                self.mark_unavailable(message);
            }
            Err(error) => {
                warn!(%error, "merge capability check failed");
            }
        }
        self.merge_capability()
    }

    /// Submit the selected tasks for concatenation. Fewer than two ids, or a
    /// backend without its merge tool, is refused before any request. The
    /// selection is cleared once the job is accepted.
    pub async fn merge(&self, selection: &MergeSelection) -> Result<ActionMessage> {
        let task_ids = selection.snapshot();
        if task_ids.len() < 2 {
            return Err(ClientError::validation(
                "select at least two completed tasks to merge",
            ));
        }
        if let MergeCapability::Unavailable { message } = self.merge_capability() {
            return Err(ClientError::FeatureUnavailable {
                code: FFMPEG_NOT_AVAILABLE.to_string(),
                message,
            });
        }

        match self.api.merge_videos(&task_ids, &self.api_key).await {
            Ok(result) => {
                info!(count = task_ids.len(), "merge submitted");
                selection.clear();
                Ok(result)
            }
            Err(ClientError::FeatureUnavailable { code, message }) => {
                self.mark_unavailable(message.clone());
                Err(ClientError::FeatureUnavailable { code, message })
            }
            Err(error) => Err(error),
        }
    }
}
