//! Image-to-video job client
//!
//! Submits image batches to a generation backend, polls the task list until
//! provider jobs finish, and drives the per-task actions.

pub mod actions;
pub mod api;
pub mod batch;
pub mod config;
pub mod credentials;
pub mod error;
pub mod poller;
pub mod render;
pub mod selection;
pub mod task;
pub mod tree;

pub use actions::{MergeCapability, TaskActions};
pub use api::{
    ActionMessage, ApiKeyCheck, CheckAllReport, FolderKind, HttpTaskApi, TaskApi, VideoStatus,
};
pub use batch::{submit_batch, BatchOutcome, BatchPlan, BatchProgress, TaskForm, TaskSubmission};
pub use config::ClientConfig;
pub use credentials::{CredentialStore, KeyUpdate};
pub use error::{ClientError, Result};
pub use poller::{PollEvent, PollReport, PollerConfig, TaskPoller};
pub use selection::MergeSelection;
pub use task::{Task, TaskId, TaskStatus};
pub use tree::{TaskRow, TaskTree};
