//! Plain-text views of the task list and task detail.

use crate::task::{format_timestamp, StatusTone, Task};
use crate::tree::{TaskRow, TaskTree};
use std::fmt::Write;

/// Placeholder shown for an empty task list
pub const EMPTY_LIST: &str = "No tasks yet";

/// Flag for a completed task the backend reports without a video
pub const MISSING_VIDEO: &str = "completed without a video";

const MESSAGE_WIDTH: usize = 48;

/// One-character badge for a status tone
pub fn tone_badge(tone: StatusTone) -> char {
    match tone {
        StatusTone::Success => '+',
        StatusTone::Danger => 'x',
        StatusTone::Warning => '!',
        StatusTone::Secondary => '-',
        StatusTone::Info => '~',
    }
}

/// Per-row buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Details,
    Preview,
    Regenerate,
    LastFrame,
    Delete,
}

impl RowAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Details => "details",
            Self::Preview => "preview",
            Self::Regenerate => "regenerate",
            Self::LastFrame => "last-frame",
            Self::Delete => "delete",
        }
    }
}

/// Actions available on a task row. Preview and last-frame need a video.
pub fn row_actions(task: &Task) -> Vec<RowAction> {
    let mut actions = vec![RowAction::Details];
    if task.has_video() {
        actions.push(RowAction::Preview);
    }
    actions.push(RowAction::Regenerate);
    if task.has_video() {
        actions.push(RowAction::LastFrame);
    }
    actions.push(RowAction::Delete);
    actions
}

fn join_url(base_url: &str, prefix: &str, path: &str) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        prefix,
        path.trim_start_matches('/')
    )
}

/// Source image URL, `/uploads/{image_path}`
pub fn upload_url(base_url: &str, task: &Task) -> Option<String> {
    task.image_path()
        .map(|path| join_url(base_url, "uploads", path))
}

/// Generated video URL, `/output/{video_path}`
pub fn output_url(base_url: &str, task: &Task) -> Option<String> {
    task.video_path()
        .map(|path| join_url(base_url, "output", path))
}

fn truncate(text: &str, width: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(width).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn render_row(out: &mut String, row: &TaskRow<'_>) {
    let task = row.task;
    let indent = "  ".repeat(row.depth);
    let marker = if row.depth > 0 { "└ " } else { "" };
    let message = task
        .message
        .as_deref()
        .map(|m| truncate(m.trim(), MESSAGE_WIDTH))
        .unwrap_or_default();
    let created = task
        .created_at
        .as_deref()
        .map(format_timestamp)
        .unwrap_or_default();
    let actions: Vec<&str> = row_actions(task).iter().map(RowAction::label).collect();
    let flag = if task.is_consistent() {
        String::new()
    } else {
        format!(" <{MISSING_VIDEO}>")
    };

    let _ = writeln!(
        out,
        "{indent}{marker}#{id:<6} {badge}[{status}]{flag} {model} {created} {message} ({actions})",
        id = task.id,
        badge = tone_badge(task.status.tone()),
        status = task.status.label(),
        model = task.short_model_name(),
        actions = actions.join(" "),
    );
}

/// Indented rows, children under their parent.
pub fn render_task_list(tasks: &[Task]) -> String {
    let tree = TaskTree::build(tasks);
    if tree.is_empty() {
        return format!("{EMPTY_LIST}\n");
    }
    let mut out = String::new();
    for row in tree.rows() {
        render_row(&mut out, &row);
    }
    out
}

pub fn render_detail(task: &Task, base_url: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Task {}", task.id);
    let _ = writeln!(out, "  status:      {}", task.status.label());
    if !task.is_consistent() {
        let _ = writeln!(out, "  warning:     {MISSING_VIDEO}");
    }
    if let Some(message) = task.message.as_deref().filter(|m| !m.is_empty()) {
        let _ = writeln!(out, "  message:     {message}");
    }
    if let Some(created) = task.created_at.as_deref() {
        let _ = writeln!(out, "  created:     {}", format_timestamp(created));
    }
    if let Some(updated) = task.updated_at.as_deref() {
        let _ = writeln!(out, "  updated:     {}", format_timestamp(updated));
    }
    if let Some(parent) = task.parent_id() {
        let _ = writeln!(out, "  parent:      #{parent}");
    }
    let _ = writeln!(out, "  model:       {}", task.short_model_name());
    if let Some(image) = upload_url(base_url, task) {
        let _ = writeln!(out, "  image:       {image}");
    }
    if let Some(prompt) = task.prompt.as_deref().filter(|p| !p.is_empty()) {
        let _ = writeln!(out, "  prompt:      {prompt}");
    }

    if let Some(video) = output_url(base_url, task) {
        let _ = writeln!(out, "  video:       {video}");
        let _ = writeln!(out, "  download:    {video}");
        if let Some(updated) = task.updated_at.as_deref() {
            let _ = writeln!(out, "  generated:   {}", format_timestamp(updated));
        }
    }
    out
}
