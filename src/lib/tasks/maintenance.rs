use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{engine::ContainerEngine, types::DockerResult};

/// Result of an image cleanup. Images that could not be removed are listed, not fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
    pub reclaimed_bytes: u64,
}

/// Operations on deployed services and the host, outside the deploy protocol.
#[derive(Clone)]
pub struct HostMaintenance {
    engine: Arc<dyn ContainerEngine>,
}

impl HostMaintenance {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        HostMaintenance { engine }
    }

    pub async fn restart_service(&self, service: &str) -> DockerResult<()> {
        self.engine.restart_container(service).await?;
        info!(service, "service restarted");
        Ok(())
    }

    pub async fn service_logs(&self, service: &str) -> DockerResult<Vec<String>> {
        self.engine.container_logs(service).await
    }

    /// Force-removes the service container, running or not.
    pub async fn remove_service(&self, service: &str) -> DockerResult<()> {
        self.engine.remove_container(service, true).await?;
        info!(service, "service removed");
        Ok(())
    }

    /// Returns the id of the named network, creating it first when it does not exist.
    pub async fn ensure_network(&self, name: &str) -> DockerResult<String> {
        match self.engine.network_id(name).await {
            Ok(id) => {
                debug!(network = name, network_id = %id, "network exists");
                Ok(id)
            }
            Err(e) if e.is_not_found() => self.engine.create_network(name).await,
            Err(e) => Err(e),
        }
    }

    pub async fn remove_network(&self, name: &str) -> DockerResult<()> {
        self.engine.remove_network(name).await?;
        info!(network = name, "network removed");
        Ok(())
    }

    /// Removes every image on the host, then prunes dangling layers.
    ///
    /// A failed listing or prune is returned. Per-image failures, such as an image held by a
    /// running container, end up in `CleanupReport::failed`.
    pub async fn cleanup_images(&self) -> DockerResult<CleanupReport> {
        let mut report = CleanupReport::default();

        for image in self.engine.list_images().await? {
            match self.engine.remove_image(&image).await {
                Ok(items) => {
                    debug!(image = %image, ?items, "image removed");
                    report.removed.push(image);
                }
                Err(e) => {
                    debug!(image = %image, error = %e, "image not removed");
                    report.failed.push(image);
                }
            }
        }

        report.reclaimed_bytes = self.engine.prune_dangling_images().await?;
        info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            reclaimed_bytes = report.reclaimed_bytes,
            "image cleanup finished"
        );
        Ok(report)
    }
}
