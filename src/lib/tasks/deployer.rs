use std::sync::Arc;

use tracing::{debug, error, info};

use super::{
    engine::{ALL_INTERFACES, BindMount, ContainerEngine, ContainerSpec, NetworkAttachment, PortBinding},
    types::{DeploymentConfig, DockerError},
};

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid deployment config: {0}")]
    InvalidConfig(#[from] serde_json::Error),
    #[error("failed to stop container {service}: {source}")]
    Stop { service: String, source: DockerError },
    #[error("failed to remove container {service}: {source}")]
    Remove { service: String, source: DockerError },
    #[error("failed to pull image {image}: {source}")]
    Pull { image: String, source: DockerError },
    #[error("failed to create container {service}: {source}")]
    Create { service: String, source: DockerError },
    #[error("failed to start container {service}: {source}")]
    Start { service: String, source: DockerError },
}

impl DeployError {
    /// Name of the protocol step that failed, for logging.
    pub fn step(&self) -> &'static str {
        match self {
            DeployError::InvalidConfig(_) => "decode",
            DeployError::Stop { .. } => "stop",
            DeployError::Remove { .. } => "remove",
            DeployError::Pull { .. } => "pull",
            DeployError::Create { .. } => "create",
            DeployError::Start { .. } => "start",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub container_id: String,
    pub image: String,
}

pub fn container_spec(config: &DeploymentConfig) -> ContainerSpec {
    let mut container_ports: Vec<&String> = config.ports.keys().collect();
    container_ports.sort();

    let exposed_ports = container_ports
        .iter()
        .map(|port| format!("{}/tcp", port))
        .collect();

    let port_bindings = container_ports
        .iter()
        .map(|port| PortBinding {
            container_port: format!("{}/tcp", port),
            host_ip: ALL_INTERFACES.to_string(),
            host_port: config.ports[*port].clone(),
        })
        .collect();

    let mut mounts: Vec<BindMount> = config
        .volume_mounts
        .iter()
        .map(|(source, target)| BindMount {
            source: source.clone(),
            target: target.clone(),
        })
        .collect();
    mounts.sort_by(|a, b| a.source.cmp(&b.source));

    let network = if !config.network_name.is_empty() && !config.network_id.is_empty() {
        Some(NetworkAttachment {
            name: config.network_name.clone(),
            id: config.network_id.clone(),
        })
    } else {
        None
    };

    ContainerSpec {
        name: config.service_name.clone(),
        image: config.image_reference(),
        env: config.env.clone(),
        exposed_ports,
        port_bindings,
        mounts,
        restart_policy: config.restart_policy.effective_name().to_string(),
        maximum_retry_count: config.restart_policy.maximum_retry_count,
        auto_remove: config.auto_remove,
        network,
    }
}

/// Replaces the container named after a service with a freshly pulled image.
///
/// Steps run in order: stop, remove, pull, create, start. A missing container during
/// stop or remove is not an error, which is what makes repeated deploys of the same
/// service safe. Any other failure aborts the remaining steps and nothing is rolled back.
pub struct ContainerDeployer {
    engine: Arc<dyn ContainerEngine>,
}

impl ContainerDeployer {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        ContainerDeployer { engine }
    }

    pub async fn deploy(&self, config: &DeploymentConfig) -> Result<DeployOutcome, DeployError> {
        let service = config.service_name.as_str();

        match self.engine.stop_container(service).await {
            Ok(()) => debug!(service, "stopped previous container"),
            Err(e) if e.is_not_found() => debug!(service, "no previous container to stop"),
            Err(source) => {
                return Err(DeployError::Stop {
                    service: service.to_string(),
                    source,
                });
            }
        }

        match self.engine.remove_container(service, false).await {
            Ok(()) => debug!(service, "removed previous container"),
            Err(e) if e.is_not_found() => debug!(service, "no previous container to remove"),
            Err(source) => {
                return Err(DeployError::Remove {
                    service: service.to_string(),
                    source,
                });
            }
        }

        let spec = container_spec(config);

        self.engine
            .pull_image(&spec.image)
            .await
            .map_err(|source| DeployError::Pull {
                image: spec.image.clone(),
                source,
            })?;

        let container_id = self
            .engine
            .create_container(&spec)
            .await
            .map_err(|source| DeployError::Create {
                service: service.to_string(),
                source,
            })?;
        info!(service, container_id = %container_id, "container created");

        if let Err(source) = self.engine.start_container(&container_id).await {
            error!(service, container_id = %container_id, "created container failed to start");
            return Err(DeployError::Start {
                service: service.to_string(),
                source,
            });
        }
        info!(service, image = %spec.image, "container started");

        Ok(DeployOutcome {
            container_id,
            image: spec.image,
        })
    }
}
