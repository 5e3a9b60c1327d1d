use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::lib::{
    config::Config,
    control_plane::{client::ApiClient, reporter::StatusReporter},
    tasks::{
        deployer::ContainerDeployer, docker::DockerEngine, engine::ContainerEngine,
        maintenance::HostMaintenance,
    },
    worker::{api::TaskServer, orchestrator::Orchestrator, worker::Worker},
};

mod lib {
    pub mod config;
    pub mod control_plane;
    pub mod tasks;
    #[cfg(test)]
    pub mod testing;
    pub mod worker;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "r_deploy=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(api_base_url = %config.api_base_url, "r_deploy starting");

    let control_plane = Arc::new(ApiClient::new(
        &config.api_base_url,
        &config.api_access_token,
        config.api_timeout,
    )?);
    let engine: Arc<dyn ContainerEngine> =
        Arc::new(DockerEngine::connect(config.registry_credentials.clone())?);

    let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
    let worker = Worker::new(
        "default_worker",
        queue_rx,
        Arc::new(ContainerDeployer::new(engine.clone())),
        StatusReporter::new(control_plane.clone()),
    );
    let worker = tokio::spawn(worker.run_tasks());

    let orchestrator = Orchestrator::new(control_plane, queue_tx);
    let server = TaskServer::new(
        orchestrator,
        HostMaintenance::new(engine),
        &config.address,
        config.port,
    );
    server
        .start_server(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    // the server owned the last queue sender, so the worker now drains and exits
    let dispatched = worker.await?;
    info!(dispatched, "r_deploy stopped");

    Ok(())
}
