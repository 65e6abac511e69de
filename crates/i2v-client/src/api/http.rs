//! reqwest implementation of the backend API
use super::{
    decode, error_from_body, key_check_from_response, merge_from_response, ActionMessage,
    ApiKeyCheck, CheckAllReport, FolderKind, TaskApi, VideoStatus,
};
use crate::batch::{image_mime, TaskSubmission};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::task::{Task, TaskId};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Backend client over HTTP/JSON
pub struct HttpTaskApi {
    base_url: String,
    client: reqwest::Client,
    list_timeout: Option<Duration>,
}

impl HttpTaskApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            list_timeout: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let api = Self::new(config.base_url.clone());
        match config.list_timeout() {
            Some(timeout) => api.with_list_timeout(timeout),
            None => api,
        }
    }

    /// Abort the bulk task list fetch after `timeout`
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Decode a successful body, or map a failed one to `ClientError`.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(error_from_body(status.as_u16(), &body));
    }
    decode(&body)
}

#[derive(Deserialize)]
struct CreatedTask {
    task_id: TaskId,
}

#[derive(Deserialize)]
struct CheckVideoResponse {
    #[serde(default)]
    updated: bool,
}

#[async_trait::async_trait]
impl TaskApi for HttpTaskApi {
    async fn test_api_key(&self, api_key: &str) -> Result<ApiKeyCheck> {
        let response = self
            .client
            .post(self.url("/api/test_api_key"))
            .json(&serde_json::json!({ "api_key": api_key }))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        key_check_from_response(status, &body)
    }

    async fn create_task(&self, submission: &TaskSubmission) -> Result<TaskId> {
        let bytes = tokio::fs::read(&submission.image).await?;
        let part = Part::bytes(bytes)
            .file_name(submission.image_file_name())
            .mime_str(image_mime(&submission.image))?;

        let mut form = Form::new();
        for (name, value) in submission.form_fields() {
            form = form.text(name, value);
        }
        form = form.part("image", part);

        let response = self
            .client
            .post(self.url("/api/tasks"))
            .multipart(form)
            .send()
            .await?;

        let created: CreatedTask = read_json(response).await?;
        Ok(created.task_id)
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut request = self.client.get(self.url("/api/tasks"));
        if let Some(timeout) = self.list_timeout {
            request = request.timeout(timeout);
        }
        read_json(request.send().await?).await
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task> {
        let response = self
            .client
            .get(self.url(&format!("/api/tasks/{id}")))
            .send()
            .await?;
        read_json(response).await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<ActionMessage> {
        let response = self
            .client
            .delete(self.url(&format!("/api/tasks/{id}")))
            .send()
            .await?;
        read_json(response).await
    }

    async fn check_task_video(&self, id: &TaskId) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&format!("/api/tasks/{id}/check_video")))
            .send()
            .await?;
        let result: CheckVideoResponse = read_json(response).await?;
        Ok(result.updated)
    }

    async fn check_video_status(&self, request_id: &str, api_key: &str) -> Result<VideoStatus> {
        let response = self
            .client
            .post(self.url("/api/check_video_status"))
            .json(&serde_json::json!({
                "request_id": request_id,
                "api_key": api_key,
            }))
            .send()
            .await?;
        let status: VideoStatus = read_json(response).await?;
        debug!(request_id, status = ?status.status, "provider video status");
        Ok(status)
    }

    async fn update_video(&self, id: &TaskId, video_url: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/api/tasks/{id}/update_video")))
            .json(&serde_json::json!({ "video_url": video_url }))
            .send()
            .await?;
        let _: serde_json::Value = read_json(response).await?;
        Ok(())
    }

    async fn regenerate(&self, id: &TaskId, api_key: &str) -> Result<ActionMessage> {
        let response = self
            .client
            .post(self.url(&format!("/api/tasks/{id}/regenerate")))
            .json(&serde_json::json!({ "api_key": api_key }))
            .send()
            .await?;
        read_json(response).await
    }

    async fn regenerate_from_last_frame(
        &self,
        id: &TaskId,
        api_key: &str,
        prompt: Option<&str>,
    ) -> Result<ActionMessage> {
        let mut body = serde_json::json!({ "api_key": api_key });
        if let Some(prompt) = prompt {
            body["prompt"] = serde_json::Value::String(prompt.to_string());
        }
        let response = self
            .client
            .post(self.url(&format!("/api/tasks/{id}/regenerate_from_last_frame")))
            .json(&body)
            .send()
            .await?;
        read_json(response).await
    }

    async fn open_folder(&self, id: &TaskId, kind: FolderKind) -> Result<ActionMessage> {
        let response = self
            .client
            .get(self.url(&format!("/api/tasks/{id}/open_folder")))
            .query(&[("type", kind.as_str())])
            .send()
            .await?;
        read_json(response).await
    }

    async fn check_all_videos(&self) -> Result<CheckAllReport> {
        let response = self
            .client
            .get(self.url("/api/tasks/check_all_videos"))
            .send()
            .await?;
        read_json(response).await
    }

    async fn merge_videos(&self, task_ids: &[TaskId], api_key: &str) -> Result<ActionMessage> {
        let response = self
            .client
            .post(self.url("/api/merge_videos"))
            .json(&serde_json::json!({
                "task_ids": task_ids,
                "api_key": api_key,
            }))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        merge_from_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let api = HttpTaskApi::new("http://localhost:5001/");
        assert_eq!(api.base_url(), "http://localhost:5001");
        assert_eq!(api.url("/api/tasks"), "http://localhost:5001/api/tasks");
    }

    #[test]
    fn test_from_config_applies_timeout() {
        let config = ClientConfig::default().with_list_timeout(5);
        let api = HttpTaskApi::from_config(&config);
        assert_eq!(api.list_timeout, Some(Duration::from_secs(5)));
    }
}
