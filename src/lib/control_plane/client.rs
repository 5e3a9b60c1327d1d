use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::types::{
    ControlPlane, ControlPlaneError, ControlPlaneResult, GetTaskResponse, TaskStatusBody,
    UpdateTaskStatusInput,
};
use crate::lib::tasks::types::{Task, TaskStatus};

/// HTTP client for the control-plane API. Every request carries the bearer token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl ApiClient {
    /// Every request, including the status updates, is bounded by `request_timeout`.
    pub fn new(
        base_url: &str,
        access_token: &str,
        request_timeout: Duration,
    ) -> ControlPlaneResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ControlPlaneError::Network(e.to_string()))?;

        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }
}

#[async_trait]
impl ControlPlane for ApiClient {
    async fn fetch_task_detail(&self, pipeline_id: &str, task_id: &str) -> ControlPlaneResult<Task> {
        let url = format!("{}/task", self.base_url);
        debug!(%url, pipeline_id, task_id, "fetching task detail");

        let resp = self
            .client
            .get(&url)
            .query(&[("pid", pipeline_id), ("id", task_id)])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ControlPlaneError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ControlPlaneError::Status(resp.status().as_u16()));
        }

        let body: GetTaskResponse = resp
            .json()
            .await
            .map_err(|e| ControlPlaneError::Decode(e.to_string()))?;

        Ok(body.payload.task)
    }

    async fn update_task_status(
        &self,
        pipeline_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> ControlPlaneResult<()> {
        let url = format!("{}/taskStatus", self.base_url);
        let input = UpdateTaskStatusInput {
            pipeline_id: pipeline_id.to_string(),
            task_id: task_id.to_string(),
            task: TaskStatusBody { status },
        };

        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&input)
            .send()
            .await
            .map_err(|e| ControlPlaneError::Network(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ControlPlaneError::Status(resp.status().as_u16()))
        }
    }
}
