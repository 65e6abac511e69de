//! Batch task submission
//!
//! Expands N images × R repeats into individual task-creation requests that
//! share one batch id, then submits them one after another.

use crate::api::TaskApi;
use crate::error::{ClientError, Result};
use crate::task::TaskId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Exclusive upper bound for generated seeds
pub const MAX_RANDOM_SEED: u32 = 2_147_483_647;

/// Largest number of tasks a single batch may expand to
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Shared form fields sent with every task of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskForm {
    pub prompt: Option<String>,
    pub user_prompt: Option<String>,
    pub seed: Option<u32>,
    pub model: Option<String>,
    pub vlm_model: Option<String>,
    pub llm_model: Option<String>,
    pub negative_prompt: Option<String>,
    pub image_size: Option<String>,
    pub extend: bool,
    pub api_key: Option<String>,
}

impl TaskForm {
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Position of one request inside its batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSlot {
    pub batch_id: String,
    pub batch_size: usize,
    pub batch_index: usize,
}

/// One task-creation request: a single image plus the shared form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSubmission {
    pub image: PathBuf,
    pub form: TaskForm,
    pub slot: BatchSlot,
}

impl TaskSubmission {
    pub fn image_file_name(&self) -> String {
        self.image
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string())
    }

    /// Text fields of the multipart form, in submission order. Unset
    /// optional fields are left out.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let form = &self.form;
        let mut fields = Vec::new();
        let optional = [
            ("prompt", &form.prompt),
            ("user_prompt", &form.user_prompt),
            ("model", &form.model),
            ("vlm_model", &form.vlm_model),
            ("llm_model", &form.llm_model),
            ("negative_prompt", &form.negative_prompt),
            ("image_size", &form.image_size),
            ("api_key", &form.api_key),
        ];
        for (name, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                fields.push((name, value.to_string()));
            }
        }
        if let Some(seed) = form.seed {
            fields.push(("seed", seed.to_string()));
        }
        if form.extend {
            fields.push(("extend", "true".to_string()));
        }
        fields.push(("batch_id", self.slot.batch_id.clone()));
        fields.push(("batch_size", self.slot.batch_size.to_string()));
        fields.push(("batch_index", self.slot.batch_index.to_string()));
        fields
    }
}

/// Generate a batch id from the current wall clock.
pub fn new_batch_id() -> String {
    format!("batch_{}", chrono::Utc::now().timestamp_millis())
}

/// Ordered list of submissions for one batch
#[derive(Debug, Clone)]
pub struct BatchPlan {
    batch_id: String,
    submissions: Vec<TaskSubmission>,
}

impl BatchPlan {
    pub fn new(images: &[PathBuf], repeat: usize, form: &TaskForm) -> Result<Self> {
        Self::with_rng(images, repeat, form, new_batch_id(), &mut rand::thread_rng())
    }

    /// Build the plan with an explicit batch id and seed source.
    ///
    /// `batch_index` is `image_index * repeat + repeat_index`. When more than
    /// one repeat is requested and the form has no seed, every submission gets
    /// its own random seed so repeats differ.
    pub fn with_rng<R: Rng + ?Sized>(
        images: &[PathBuf],
        repeat: usize,
        form: &TaskForm,
        batch_id: String,
        rng: &mut R,
    ) -> Result<Self> {
        if images.is_empty() {
            return Err(ClientError::validation("select at least one image"));
        }
        if repeat == 0 {
            return Err(ClientError::validation("task count must be at least 1"));
        }

        let batch_size = images
            .len()
            .checked_mul(repeat)
            .filter(|&size| size <= MAX_BATCH_SIZE)
            .ok_or_else(|| {
                ClientError::validation(format!(
                    "{} images x {repeat} exceeds the batch limit of {MAX_BATCH_SIZE} tasks",
                    images.len()
                ))
            })?;
        let randomize_seed = repeat > 1 && form.seed.is_none();
        let mut submissions = Vec::with_capacity(batch_size);

        for (image_index, image) in images.iter().enumerate() {
            for repeat_index in 0..repeat {
                let mut form = form.clone();
                if randomize_seed {
                    form.seed = Some(rng.gen_range(0..MAX_RANDOM_SEED));
                }
                submissions.push(TaskSubmission {
                    image: image.clone(),
                    form,
                    slot: BatchSlot {
                        batch_id: batch_id.clone(),
                        batch_size,
                        batch_index: image_index * repeat + repeat_index,
                    },
                });
            }
        }

        Ok(Self {
            batch_id,
            submissions,
        })
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn submissions(&self) -> &[TaskSubmission] {
        &self.submissions
    }

    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }
}

/// Progress after each request, successful or not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub succeeded: usize,
    pub total: usize,
}

impl BatchProgress {
    /// Completion percentage, rounded
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed as f64 / self.total as f64) * 100.0).round() as u32
    }
}

#[derive(Debug)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub image: PathBuf,
    pub error: ClientError,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub total: usize,
    pub created: Vec<TaskId>,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.created.len()
    }
}

/// Submit every request of `plan` in order.
///
/// A failed request is logged and recorded, and the remaining requests still
/// go out. `on_progress` runs after every request.
pub async fn submit_batch<F>(api: &dyn TaskApi, plan: &BatchPlan, mut on_progress: F) -> BatchOutcome
where
    F: FnMut(BatchProgress),
{
    let total = plan.len();
    let mut created = Vec::new();
    let mut failures = Vec::new();

    info!(batch_id = plan.batch_id(), total, "submitting batch");

    for (completed, submission) in plan.submissions().iter().enumerate() {
        match api.create_task(submission).await {
            Ok(task_id) => {
                info!(
                    batch_index = submission.slot.batch_index,
                    %task_id,
                    "task created"
                );
                created.push(task_id);
            }
            Err(error) => {
                warn!(
                    batch_index = submission.slot.batch_index,
                    image = %submission.image.display(),
                    %error,
                    "task creation failed"
                );
                failures.push(BatchFailure {
                    batch_index: submission.slot.batch_index,
                    image: submission.image.clone(),
                    error,
                });
            }
        }

        on_progress(BatchProgress {
            completed: completed + 1,
            succeeded: created.len(),
            total,
        });
    }

    BatchOutcome {
        batch_id: plan.batch_id().to_string(),
        total,
        created,
        failures,
    }
}

/// Guess the upload content type from the file extension.
pub fn image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}
