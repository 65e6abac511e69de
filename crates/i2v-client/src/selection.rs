//! Tasks selected for a video merge.
//!
//! This is the only mutable client-side state. All methods are synchronous
//! and never hold the lock across an await.

use crate::error::{ClientError, Result};
use crate::task::{Task, TaskId};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MergeSelection {
    inner: Arc<Mutex<Vec<TaskId>>>,
}

impl MergeSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only tasks with a finished video can be merged.
    pub fn is_eligible(task: &Task) -> bool {
        task.status.is_completed() && task.has_video()
    }

    /// Add `task` to the selection, in click order.
    pub fn select(&self, task: &Task) -> Result<()> {
        if !Self::is_eligible(task) {
            return Err(ClientError::validation(format!(
                "task {} has no finished video",
                task.id
            )));
        }
        let mut ids = self.inner.lock();
        if !ids.contains(&task.id) {
            ids.push(task.id.clone());
        }
        Ok(())
    }

    /// Add an id without an eligibility check; the backend validates it.
    pub fn select_id(&self, id: TaskId) {
        let mut ids = self.inner.lock();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    pub fn deselect(&self, id: &TaskId) -> bool {
        let mut ids = self.inner.lock();
        let before = ids.len();
        ids.retain(|existing| existing != id);
        ids.len() != before
    }

    /// Flip membership of `task`, returning whether it is now selected.
    pub fn toggle(&self, task: &Task) -> Result<bool> {
        if self.deselect(&task.id) {
            return Ok(false);
        }
        self.select(task)?;
        Ok(true)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.inner.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<TaskId> {
        self.inner.lock().clone()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
