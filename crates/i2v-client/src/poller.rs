//! Task list poller
//!
//! Each cycle fetches the full task list, hands it to the caller for
//! rendering, checks every task with an outstanding provider job, and
//! re-fetches once if any check stored a video.

use crate::api::TaskApi;
use crate::error::{ClientError, Result};
use crate::task::{Task, TaskId};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Extra attempts after a failed task list fetch
    pub fetch_retries: u32,
    pub retry_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            fetch_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    /// Latest list, the re-fetched one when `refetched` is set
    pub tasks: Vec<Task>,
    pub checked: Vec<TaskId>,
    pub updated: Vec<TaskId>,
    pub refetched: bool,
    /// Completed tasks the backend reported without a video
    pub flagged: Vec<TaskId>,
}

#[derive(Debug)]
pub enum PollEvent {
    /// A freshly fetched list, ready to render
    Tasks(Vec<Task>),
    Report(PollReport),
    Error(ClientError),
}

/// Completed tasks that carry no video, logged once per fetch.
fn flag_inconsistent(tasks: &[Task]) -> Vec<TaskId> {
    tasks
        .iter()
        .filter(|t| !t.is_consistent())
        .map(|t| {
            warn!(task_id = %t.id, status = %t.status, "completed task has no video");
            t.id.clone()
        })
        .collect()
}

/// Tasks the cycle must re-check against the status endpoints.
pub fn select_for_check(tasks: &[Task]) -> Vec<&Task> {
    tasks.iter().filter(|t| t.needs_status_check()).collect()
}

pub struct TaskPoller {
    api: Arc<dyn TaskApi>,
    api_key: String,
    config: PollerConfig,
}

impl TaskPoller {
    pub fn new(api: Arc<dyn TaskApi>, config: PollerConfig) -> Self {
        Self {
            api,
            api_key: String::new(),
            config,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Fetch the task list, retrying a failed fetch with a fixed delay.
    pub async fn fetch_with_retry(&self) -> Result<Vec<Task>> {
        let attempts = self.config.fetch_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.api.list_tasks().await {
                Ok(tasks) => return Ok(tasks),
                Err(error) if attempt >= attempts => {
                    return Err(ClientError::RetriesExhausted {
                        attempts,
                        last: Box::new(error),
                    });
                }
                Err(error) => {
                    warn!(attempt, attempts, %error, "task list fetch failed, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Check one task. A task with a provider request id is asked about
    /// directly, and a finished video is stored through `update_video`.
    /// Without a request id the task-scoped check endpoint decides.
    pub async fn check_task(&self, task: &Task) -> Result<bool> {
        let Some(request_id) = task.request_id() else {
            return self.api.check_task_video(&task.id).await;
        };

        let status = self.api.check_video_status(request_id, &self.api_key).await?;
        match status.video_url() {
            Some(url) => {
                self.api.update_video(&task.id, url).await?;
                info!(task_id = %task.id, "video stored");
                Ok(true)
            }
            None => {
                debug!(task_id = %task.id, status = ?status.status, "video not ready");
                Ok(false)
            }
        }
    }

    pub async fn cycle(&self) -> Result<PollReport> {
        self.cycle_with(|_| {}).await
    }

    /// Run one cycle, calling `on_tasks` with every list fetched.
    pub async fn cycle_with<F>(&self, mut on_tasks: F) -> Result<PollReport>
    where
        F: FnMut(&[Task]) + Send,
    {
        let tasks = self.fetch_with_retry().await?;
        on_tasks(&tasks);
        let flagged = flag_inconsistent(&tasks);

        let pending = select_for_check(&tasks);
        if pending.is_empty() {
            return Ok(PollReport {
                tasks,
                flagged,
                ..PollReport::default()
            });
        }

        debug!(count = pending.len(), "checking video status");
        let checked: Vec<TaskId> = pending.iter().map(|t| t.id.clone()).collect();
        let results = join_all(pending.iter().map(|task| async move {
            match self.check_task(task).await {
                Ok(updated) => updated,
                Err(error) => {
                    warn!(task_id = %task.id, %error, "status check failed");
                    false
                }
            }
        }))
        .await;

        let updated: Vec<TaskId> = checked
            .iter()
            .zip(results)
            .filter(|(_, updated)| *updated)
            .map(|(id, _)| id.clone())
            .collect();

        if updated.is_empty() {
            return Ok(PollReport {
                tasks,
                checked,
                updated,
                refetched: false,
                flagged,
            });
        }

        info!(count = updated.len(), "videos updated, reloading task list");
        let tasks = self.fetch_with_retry().await?;
        on_tasks(&tasks);
        let flagged = flag_inconsistent(&tasks);
        Ok(PollReport {
            tasks,
            checked,
            updated,
            refetched: true,
            flagged,
        })
    }

    /// Poll on the configured interval until `events` is closed.
    ///
    /// Each tick spawns its own cycle, so a slow cycle may still be running
    /// when the next one starts.
    pub async fn run(self: Arc<Self>, events: mpsc::UnboundedSender<PollEvent>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if events.is_closed() {
                debug!("poll receiver dropped, stopping");
                break;
            }

            let poller = Arc::clone(&self);
            let tx = events.clone();
            tokio::spawn(async move {
                let list_tx = tx.clone();
                let result = poller
                    .cycle_with(move |tasks| {
                        let _ = list_tx.send(PollEvent::Tasks(tasks.to_vec()));
                    })
                    .await;
                let event = match result {
                    Ok(report) => PollEvent::Report(report),
                    Err(error) => PollEvent::Error(error),
                };
                let _ = tx.send(event);
            });
        }
    }

    /// Start `run` on the runtime and return its event stream.
    pub fn spawn(self: Arc<Self>) -> (mpsc::UnboundedReceiver<PollEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(tx));
        (rx, handle)
    }
}
