use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::lib::tasks::types::{Task, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("network error: {0}")]
    Network(String),
    #[error("control plane responded with status {0}")]
    Status(u16),
    #[error("failed to decode control plane response: {0}")]
    Decode(String),
}

pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// The API that owns pipelines, tasks and their statuses.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn fetch_task_detail(&self, pipeline_id: &str, task_id: &str) -> ControlPlaneResult<Task>;

    async fn update_task_status(
        &self,
        pipeline_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> ControlPlaneResult<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskResponse {
    pub payload: GetTaskPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskPayload {
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusBody {
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskStatusInput {
    pub pipeline_id: String,
    pub task_id: String,
    pub task: TaskStatusBody,
}
