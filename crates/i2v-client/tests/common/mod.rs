#![allow(dead_code)]

use i2v_client::api::{
    ActionMessage, ApiKeyCheck, CheckAllReport, FolderKind, TaskApi, VideoStatus,
};
use i2v_client::batch::TaskSubmission;
use i2v_client::error::{ClientError, Result, FFMPEG_NOT_AVAILABLE};
use i2v_client::task::{Task, TaskId, TaskStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    TestApiKey(String),
    CreateTask(usize),
    ListTasks,
    GetTask(TaskId),
    DeleteTask(TaskId),
    CheckTaskVideo(TaskId),
    CheckVideoStatus(String),
    UpdateVideo(TaskId, String),
    Regenerate(TaskId),
    RegenerateFromLastFrame(TaskId, Option<String>),
    OpenFolder(TaskId, FolderKind),
    CheckAllVideos,
    MergeVideos(Vec<TaskId>),
}

#[derive(Default)]
struct State {
    tasks: Vec<Task>,
    calls: Vec<Call>,
    failing_indices: HashSet<usize>,
    list_failures: u32,
    video_statuses: HashMap<String, VideoStatus>,
    fallback_updates: HashSet<TaskId>,
    valid_key: Option<String>,
    merge_available: bool,
    next_id: i64,
}

/// In-memory backend that records every call
pub struct FakeApi {
    state: Mutex<State>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                merge_available: true,
                next_id: 100,
                ..State::default()
            }),
        }
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let api = Self::new();
        api.state.lock().tasks = tasks;
        api
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn fail_create_at(&self, batch_index: usize) {
        self.state.lock().failing_indices.insert(batch_index);
    }

    /// Fail the next `count` list fetches.
    pub fn fail_lists(&self, count: u32) {
        self.state.lock().list_failures = count;
    }

    pub fn set_video_status(&self, request_id: &str, status: VideoStatus) {
        self.state
            .lock()
            .video_statuses
            .insert(request_id.to_string(), status);
    }

    /// Make the task-scoped check report an update for `id`.
    pub fn complete_on_fallback(&self, id: impl Into<TaskId>) {
        self.state.lock().fallback_updates.insert(id.into());
    }

    pub fn accept_key(&self, key: &str) {
        self.state.lock().valid_key = Some(key.to_string());
    }

    pub fn set_merge_available(&self, available: bool) {
        self.state.lock().merge_available = available;
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count<F: Fn(&Call) -> bool>(&self, pred: F) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

fn not_found(id: &TaskId) -> ClientError {
    ClientError::Http {
        status: 404,
        message: format!("task {id} not found"),
    }
}

/// Task with a provider job outstanding
pub fn waiting_task(id: i64, request_id: &str) -> Task {
    let mut task = Task::new(id, TaskStatus::WaitingForVideo);
    task.request_id = Some(request_id.to_string());
    task
}

pub fn finished_task(id: i64, video: &str) -> Task {
    let mut task = Task::new(id, TaskStatus::Completed);
    task.video_path = Some(video.to_string());
    task
}

#[async_trait::async_trait]
impl TaskApi for FakeApi {
    async fn test_api_key(&self, api_key: &str) -> Result<ApiKeyCheck> {
        self.record(Call::TestApiKey(api_key.to_string()));
        let valid = self.state.lock().valid_key.as_deref() == Some(api_key);
        Ok(ApiKeyCheck {
            success: valid,
            message: if valid { "key ok" } else { "invalid key" }.to_string(),
        })
    }

    async fn create_task(&self, submission: &TaskSubmission) -> Result<TaskId> {
        let index = submission.slot.batch_index;
        self.record(Call::CreateTask(index));
        let mut state = self.state.lock();
        if state.failing_indices.contains(&index) {
            return Err(ClientError::Http {
                status: 500,
                message: format!("upload {index} rejected"),
            });
        }
        state.next_id += 1;
        let mut task = Task::new(state.next_id, TaskStatus::Pending);
        task.image_path = Some(submission.image_file_name());
        task.prompt = submission.form.prompt.clone();
        let id = task.id.clone();
        state.tasks.push(task);
        Ok(id)
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.record(Call::ListTasks);
        let mut state = self.state.lock();
        if state.list_failures > 0 {
            state.list_failures -= 1;
            return Err(ClientError::Http {
                status: 503,
                message: "busy".to_string(),
            });
        }
        Ok(state.tasks.clone())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.record(Call::GetTask(id.clone()));
        let state = self.state.lock();
        state
            .tasks
            .iter()
            .find(|t| &t.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn delete_task(&self, id: &TaskId) -> Result<ActionMessage> {
        self.record(Call::DeleteTask(id.clone()));
        let mut state = self.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|t| &t.id != id);
        if state.tasks.len() == before {
            return Err(not_found(id));
        }
        Ok(ActionMessage::with_message("Task deleted"))
    }

    async fn check_task_video(&self, id: &TaskId) -> Result<bool> {
        self.record(Call::CheckTaskVideo(id.clone()));
        let mut state = self.state.lock();
        if !state.fallback_updates.remove(id) {
            return Ok(false);
        }
        if let Some(task) = state.tasks.iter_mut().find(|t| &t.id == id) {
            task.status = TaskStatus::Completed;
            task.video_path = Some(format!("{id}.mp4"));
        }
        Ok(true)
    }

    async fn check_video_status(&self, request_id: &str, _api_key: &str) -> Result<VideoStatus> {
        self.record(Call::CheckVideoStatus(request_id.to_string()));
        self.state
            .lock()
            .video_statuses
            .get(request_id)
            .cloned()
            .ok_or_else(|| ClientError::Http {
                status: 500,
                message: format!("unknown request {request_id}"),
            })
    }

    async fn update_video(&self, id: &TaskId, video_url: &str) -> Result<()> {
        self.record(Call::UpdateVideo(id.clone(), video_url.to_string()));
        let mut state = self.state.lock();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| not_found(id))?;
        task.status = TaskStatus::Completed;
        task.video_path = Some(format!("{id}.mp4"));
        Ok(())
    }

    async fn regenerate(&self, id: &TaskId, _api_key: &str) -> Result<ActionMessage> {
        self.record(Call::Regenerate(id.clone()));
        Ok(ActionMessage::with_message("regenerating"))
    }

    async fn regenerate_from_last_frame(
        &self,
        id: &TaskId,
        _api_key: &str,
        prompt: Option<&str>,
    ) -> Result<ActionMessage> {
        self.record(Call::RegenerateFromLastFrame(
            id.clone(),
            prompt.map(str::to_string),
        ));
        Ok(ActionMessage::with_message("created from last frame"))
    }

    async fn open_folder(&self, id: &TaskId, kind: FolderKind) -> Result<ActionMessage> {
        self.record(Call::OpenFolder(id.clone(), kind));
        Ok(ActionMessage::with_message("folder opened"))
    }

    async fn check_all_videos(&self) -> Result<CheckAllReport> {
        self.record(Call::CheckAllVideos);
        Ok(CheckAllReport {
            message: Some("checked".to_string()),
            updated_tasks: Vec::new(),
        })
    }

    async fn merge_videos(&self, task_ids: &[TaskId], _api_key: &str) -> Result<ActionMessage> {
        self.record(Call::MergeVideos(task_ids.to_vec()));
        let mut state = self.state.lock();
        if !state.merge_available {
            return Err(ClientError::FeatureUnavailable {
                code: FFMPEG_NOT_AVAILABLE.to_string(),
                message: "ffmpeg is not installed".to_string(),
            });
        }
        state.next_id += 1;
        Ok(ActionMessage {
            success: Some(true),
            message: Some("merge submitted".to_string()),
            task_id: Some(TaskId::from(state.next_id)),
        })
    }
}
