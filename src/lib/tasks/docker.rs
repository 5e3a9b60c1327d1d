use std::collections::HashMap;

use async_trait::async_trait;
use bollard::{
    Docker,
    auth::DockerCredentials,
    container::{
        Config, CreateContainerOptions, LogsOptions, NetworkingConfig, RemoveContainerOptions,
        StartContainerOptions,
    },
    errors::Error as BollardError,
    image::{CreateImageOptions, ListImagesOptions, PruneImagesOptions, RemoveImageOptions},
    models::{
        EndpointSettings, HostConfig, Mount, MountTypeEnum, PortBinding, RestartPolicy,
        RestartPolicyNameEnum,
    },
    network::{CreateNetworkOptions, InspectNetworkOptions},
};
use futures_util::stream::StreamExt;
use tracing::{debug, info};

use super::{
    engine::{ContainerEngine, ContainerSpec},
    types::{DockerError, DockerResult},
};

/// Username and password for the registry images are pulled from.
#[derive(Debug, Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

/// `ContainerEngine` backed by the local Docker daemon.
pub struct DockerEngine {
    client: Docker,
    credentials: Option<DockerCredentials>,
}

impl DockerEngine {
    /// Connects using `DOCKER_HOST` when set, the local socket otherwise.
    pub fn connect(credentials: Option<RegistryCredentials>) -> DockerResult<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::ClientError(e.to_string()))?;

        Ok(DockerEngine {
            client,
            credentials: credentials.map(|c| DockerCredentials {
                username: Some(c.username),
                password: Some(c.password),
                ..Default::default()
            }),
        })
    }
}

fn map_error(err: BollardError, subject: &str) -> DockerError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => DockerError::NotFound(format!("{}: {}", subject, message)),
        other => DockerError::ClientError(format!("{}: {}", subject, other)),
    }
}

pub fn container_config(spec: &ContainerSpec) -> DockerResult<Config<String>> {
    let restart_policy_name = spec
        .restart_policy
        .parse::<RestartPolicyNameEnum>()
        .map_err(|_| {
            DockerError::ClientError(format!("unknown restart policy: {}", spec.restart_policy))
        })?;

    let restart_policy = RestartPolicy {
        name: Some(restart_policy_name),
        maximum_retry_count: Some(spec.maximum_retry_count),
    };

    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for binding in &spec.port_bindings {
        port_bindings
            .entry(binding.container_port.clone())
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: Some(binding.host_ip.clone()),
                host_port: Some(binding.host_port.clone()),
            });
    }

    let mounts: Vec<Mount> = spec
        .mounts
        .iter()
        .map(|m| Mount {
            typ: Some(MountTypeEnum::BIND),
            source: Some(m.source.clone()),
            target: Some(m.target.clone()),
            ..Default::default()
        })
        .collect();

    let host_config = HostConfig {
        auto_remove: Some(spec.auto_remove),
        restart_policy: Some(restart_policy),
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        mounts: (!mounts.is_empty()).then_some(mounts),
        ..Default::default()
    };

    let networking_config = spec.network.as_ref().map(|network| NetworkingConfig {
        endpoints_config: HashMap::from([(
            network.name.clone(),
            EndpointSettings {
                network_id: Some(network.id.clone()),
                ..Default::default()
            },
        )]),
    });

    Ok(Config {
        image: Some(spec.image.clone()),
        env: Some(spec.env.clone()),
        exposed_ports: (!spec.exposed_ports.is_empty()).then(|| {
            spec.exposed_ports
                .iter()
                .map(|port| (port.clone(), HashMap::new()))
                .collect()
        }),
        host_config: Some(host_config),
        networking_config,
        ..Default::default()
    })
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn stop_container(&self, name: &str) -> DockerResult<()> {
        match self.client.stop_container(name, None).await {
            Ok(_) => Ok(()),
            // 304: already stopped
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_error(e, name)),
        }
    }

    async fn remove_container(&self, name: &str, force: bool) -> DockerResult<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client
            .remove_container(name, Some(options))
            .await
            .map_err(|e| map_error(e, name))
    }

    async fn pull_image(&self, image: &str) -> DockerResult<()> {
        info!(image, "pulling image");

        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            self.credentials.clone(),
        );

        while let Some(msg) = stream.next().await {
            let info = msg.map_err(|e| map_error(e, image))?;
            if let Some(status) = info.status {
                debug!(image, status = %status, progress = info.progress.as_deref(), "pull progress");
            }
        }

        info!(image, "image pulled");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> DockerResult<String> {
        let config = container_config(spec)?;
        let options = Some(CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        });

        let resp = self
            .client
            .create_container(options, config)
            .await
            .map_err(|e| map_error(e, &spec.name))?;

        for warning in &resp.warnings {
            debug!(container = %spec.name, warning = %warning, "create warning");
        }
        Ok(resp.id)
    }

    async fn start_container(&self, container_id: &str) -> DockerResult<()> {
        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_error(e, container_id))
    }

    async fn restart_container(&self, name: &str) -> DockerResult<()> {
        self.client
            .restart_container(name, None)
            .await
            .map_err(|e| map_error(e, name))
    }

    async fn container_logs(&self, name: &str) -> DockerResult<Vec<String>> {
        let mut stream = self.client.logs(
            name,
            Some(LogsOptions::<String> {
                stdout: true,
                tail: "all".to_string(),
                ..Default::default()
            }),
        );

        let mut lines = Vec::new();
        while let Some(output) = stream.next().await {
            let output = output.map_err(|e| map_error(e, name))?;
            lines.push(output.to_string().trim_end_matches('\n').to_string());
        }
        Ok(lines)
    }

    async fn create_network(&self, name: &str) -> DockerResult<String> {
        let resp = self
            .client
            .create_network(CreateNetworkOptions {
                name: name.to_string(),
                driver: "bridge".to_string(),
                ..Default::default()
            })
            .await
            .map_err(|e| map_error(e, name))?;

        if !resp.warning.is_empty() {
            debug!(network = name, warning = %resp.warning, "create network warning");
        }
        info!(network = name, network_id = %resp.id, "network created");
        Ok(resp.id)
    }

    async fn network_id(&self, name: &str) -> DockerResult<String> {
        let network = self
            .client
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|e| map_error(e, name))?;

        network
            .id
            .ok_or_else(|| DockerError::ClientError(format!("{}: network has no id", name)))
    }

    async fn remove_network(&self, name: &str) -> DockerResult<()> {
        self.client
            .remove_network(name)
            .await
            .map_err(|e| map_error(e, name))
    }

    async fn list_images(&self) -> DockerResult<Vec<String>> {
        let images = self
            .client
            .list_images(None::<ListImagesOptions<String>>)
            .await
            .map_err(|e| map_error(e, "images"))?;

        Ok(images.into_iter().map(|image| image.id).collect())
    }

    async fn remove_image(&self, image_id: &str) -> DockerResult<Vec<String>> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        let items = self
            .client
            .remove_image(image_id, Some(options), None)
            .await
            .map_err(|e| map_error(e, image_id))?;

        Ok(items
            .into_iter()
            .flat_map(|item| item.untagged.into_iter().chain(item.deleted))
            .collect())
    }

    async fn prune_dangling_images(&self) -> DockerResult<u64> {
        let report = self
            .client
            .prune_images(None::<PruneImagesOptions<String>>)
            .await
            .map_err(|e| map_error(e, "images"))?;

        let reclaimed = report.space_reclaimed.unwrap_or(0);
        Ok(u64::try_from(reclaimed).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::tasks::engine::{ALL_INTERFACES, BindMount, NetworkAttachment, PortBinding};

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "api".to_string(),
            image: "api:1.0".to_string(),
            env: vec!["A=1".to_string()],
            exposed_ports: vec!["8080/tcp".to_string()],
            port_bindings: vec![PortBinding {
                container_port: "8080/tcp".to_string(),
                host_ip: ALL_INTERFACES.to_string(),
                host_port: "9090".to_string(),
            }],
            mounts: vec![BindMount {
                source: "/srv/data".to_string(),
                target: "/data".to_string(),
            }],
            restart_policy: "on-failure".to_string(),
            maximum_retry_count: 3,
            auto_remove: false,
            network: None,
        }
    }

    #[test]
    fn port_mapping_is_published_on_all_interfaces() {
        let config = container_config(&spec()).unwrap();

        let exposed = config.exposed_ports.unwrap();
        assert!(exposed.contains_key("8080/tcp"));

        let host_config = config.host_config.unwrap();
        let bindings = host_config.port_bindings.unwrap();
        let binding = &bindings["8080/tcp"].as_ref().unwrap()[0];
        assert_eq!(binding.host_port.as_deref(), Some("9090"));
        assert_eq!(binding.host_ip.as_deref(), Some("0.0.0.0"));
    }

    #[test]
    fn restart_policy_and_mounts_are_translated() {
        let config = container_config(&spec()).unwrap();
        let host_config = config.host_config.unwrap();

        let policy = host_config.restart_policy.unwrap();
        assert_eq!(policy.name, Some(RestartPolicyNameEnum::ON_FAILURE));
        assert_eq!(policy.maximum_retry_count, Some(3));

        let mounts = host_config.mounts.unwrap();
        assert_eq!(mounts[0].typ, Some(MountTypeEnum::BIND));
        assert_eq!(mounts[0].source.as_deref(), Some("/srv/data"));
        assert_eq!(mounts[0].target.as_deref(), Some("/data"));
        assert!(config.networking_config.is_none());
    }

    #[test]
    fn network_is_attached_by_name() {
        let mut spec = spec();
        spec.network = Some(NetworkAttachment {
            name: "backend".to_string(),
            id: "n-123".to_string(),
        });

        let config = container_config(&spec).unwrap();
        let endpoints = config.networking_config.unwrap().endpoints_config;
        assert_eq!(endpoints["backend"].network_id.as_deref(), Some("n-123"));
    }

    #[test]
    fn unknown_restart_policy_is_rejected() {
        let mut spec = spec();
        spec.restart_policy = "sometimes".to_string();
        assert!(matches!(
            container_config(&spec),
            Err(DockerError::ClientError(_))
        ));
    }
}
