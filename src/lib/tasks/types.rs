use std::{collections::HashMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

pub const DEFAULT_RESTART_POLICY: &str = "on-failure";
pub const DEFAULT_IMAGE_TAG: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    TimedOut,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed | TaskStatus::TimedOut)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Done => "Done",
            TaskStatus::Failed => "Failed",
            TaskStatus::TimedOut => "TimedOut",
        };
        f.write_str(name)
    }
}

/// A pipeline task as served by the control plane. Never mutated locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Deployment configuration, opaque until decoded into a `DeploymentConfig`.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Declared timeout in minutes. Zero or negative means no timeout.
    #[serde(default)]
    pub timeout: i64,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl Task {
    pub fn timeout(&self) -> Option<Duration> {
        let minutes = u64::try_from(self.timeout).ok().filter(|m| *m > 0)?;
        Some(Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub fn deployment_config(&self) -> Result<DeploymentConfig, serde_json::Error> {
        DeploymentConfig::deserialize(&self.config)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartPolicy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub maximum_retry_count: i64,
}

impl RestartPolicy {
    /// Policy name with the empty name resolved to `on-failure`.
    pub fn effective_name(&self) -> &str {
        if self.name.is_empty() {
            DEFAULT_RESTART_POLICY
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// Stable container name. Replacement is keyed on it.
    pub service_name: String,
    pub image_name: String,
    #[serde(default)]
    pub image_tag: String,
    #[serde(default)]
    pub env: Vec<String>,
    /// Container port to host port.
    #[serde(default)]
    pub ports: HashMap<String, String>,
    /// Host path to container path.
    #[serde(default)]
    pub volume_mounts: HashMap<String, String>,
    #[serde(default)]
    pub network_name: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub auto_remove: bool,
}

impl DeploymentConfig {
    pub fn image_reference(&self) -> String {
        let tag = if self.image_tag.is_empty() {
            DEFAULT_IMAGE_TAG
        } else {
            &self.image_tag
        };
        format!("{}:{}", self.image_name, tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DockerError {
    #[error("no such container or image: {0}")]
    NotFound(String),
    #[error("docker client error: {0}")]
    ClientError(String),
}

impl DockerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DockerError::NotFound(_))
    }
}

pub type DockerResult<T> = Result<T, DockerError>;
