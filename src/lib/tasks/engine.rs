use async_trait::async_trait;

use super::types::DockerResult;

pub const ALL_INTERFACES: &str = "0.0.0.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Container side, e.g. `8080/tcp`.
    pub container_port: String,
    pub host_ip: String,
    pub host_port: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub name: String,
    pub id: String,
}

/// Runtime configuration of a container, independent of the engine that creates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub exposed_ports: Vec<String>,
    pub port_bindings: Vec<PortBinding>,
    pub mounts: Vec<BindMount>,
    pub restart_policy: String,
    pub maximum_retry_count: i64,
    pub auto_remove: bool,
    pub network: Option<NetworkAttachment>,
}

/// Container, network and image operations of the host engine.
///
/// Containers and networks are addressed by name, and a missing one must be reported as
/// `DockerError::NotFound`.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn stop_container(&self, name: &str) -> DockerResult<()>;

    /// With `force` a running container is killed first.
    async fn remove_container(&self, name: &str, force: bool) -> DockerResult<()>;

    async fn pull_image(&self, image: &str) -> DockerResult<()>;

    /// Returns the id of the created container.
    async fn create_container(&self, spec: &ContainerSpec) -> DockerResult<String>;

    async fn start_container(&self, container_id: &str) -> DockerResult<()>;

    async fn restart_container(&self, name: &str) -> DockerResult<()>;

    /// Stdout of the container, one entry per log line.
    async fn container_logs(&self, name: &str) -> DockerResult<Vec<String>>;

    /// Creates a bridge network and returns its id.
    async fn create_network(&self, name: &str) -> DockerResult<String>;

    async fn network_id(&self, name: &str) -> DockerResult<String>;

    async fn remove_network(&self, name: &str) -> DockerResult<()>;

    /// Ids of the images on the host.
    async fn list_images(&self) -> DockerResult<Vec<String>>;

    /// Force-removes an image and returns what was untagged or deleted.
    async fn remove_image(&self, image_id: &str) -> DockerResult<Vec<String>>;

    /// Deletes dangling image layers and returns the bytes reclaimed.
    async fn prune_dangling_images(&self) -> DockerResult<u64>;
}
