use serde::{Deserialize, Serialize};

use crate::lib::{
    control_plane::types::ControlPlaneError,
    tasks::types::{DockerError, Task},
};

pub const CODE_OK: i32 = 0;
pub const CODE_CLIENT_ERROR: i32 = 1;
pub const CODE_SERVER_ERROR: i32 = 2;

pub const MSG_CLIENT_ERROR: &str = "client error";

/// Body of the webhook the control plane calls when a task is ready to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub payload: NotificationPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub pipeline_id: String,
    pub task_id: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub code: i32,
    pub msg: String,
}

impl Acknowledgment {
    pub fn ok() -> Self {
        Acknowledgment::default()
    }

    pub fn client_error(msg: impl Into<String>) -> Self {
        Acknowledgment {
            code: CODE_CLIENT_ERROR,
            msg: msg.into(),
        }
    }

    pub fn server_error(msg: impl Into<String>) -> Self {
        Acknowledgment {
            code: CODE_SERVER_ERROR,
            msg: msg.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub network_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkResponse {
    pub network_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsResponse {
    pub lines: Vec<String>,
}

/// One accepted task, waiting for the worker.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub dispatch_id: uuid::Uuid,
    pub pipeline_id: String,
    pub task: Task,
    pub arguments: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("malformed notification: {0}")]
    InvalidNotification(String),
    #[error("failed to fetch task detail: {0}")]
    FetchFailed(#[from] ControlPlaneError),
    #[error("dispatch queue is closed")]
    QueueClosed,
}

impl From<WorkerError> for Acknowledgment {
    fn from(err: WorkerError) -> Self {
        match &err {
            WorkerError::InvalidNotification(_) => Acknowledgment::client_error(err.to_string()),
            WorkerError::FetchFailed(ControlPlaneError::Status(_)) => {
                Acknowledgment::client_error(MSG_CLIENT_ERROR)
            }
            WorkerError::FetchFailed(_) | WorkerError::QueueClosed => {
                Acknowledgment::server_error(err.to_string())
            }
        }
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;

impl From<DockerError> for Acknowledgment {
    fn from(err: DockerError) -> Self {
        match &err {
            DockerError::NotFound(_) => Acknowledgment::client_error(err.to_string()),
            DockerError::ClientError(_) => Acknowledgment::server_error(err.to_string()),
        }
    }
}
