//! In-memory stand-ins for the Docker daemon and the control plane.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::lib::{
    control_plane::types::{ControlPlane, ControlPlaneError, ControlPlaneResult},
    tasks::{
        engine::{ContainerEngine, ContainerSpec},
        types::{DockerError, DockerResult, Task, TaskStatus},
    },
};

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub spec: ContainerSpec,
    pub running: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    containers: HashMap<String, FakeContainer>,
    networks: HashMap<String, String>,
    images: Vec<String>,
    images_in_use: Vec<String>,
    logs: HashMap<String, Vec<String>>,
    restarts: HashMap<String, usize>,
    calls: Vec<String>,
    fail_stop: bool,
    fail_pull: bool,
    fail_start: bool,
    fail_prune: bool,
}

/// Tracks containers by name and enforces name uniqueness on create.
#[derive(Debug, Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
    pull_delay: Option<Duration>,
    next_id: AtomicUsize,
}

impl FakeEngine {
    pub fn failing_stop(self) -> Self {
        self.state.lock().unwrap().fail_stop = true;
        self
    }

    pub fn failing_pull(self) -> Self {
        self.state.lock().unwrap().fail_pull = true;
        self
    }

    pub fn failing_start(self) -> Self {
        self.state.lock().unwrap().fail_start = true;
        self
    }

    pub fn failing_prune(self) -> Self {
        self.state.lock().unwrap().fail_prune = true;
        self
    }

    pub fn with_network(self, name: &str, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .networks
            .insert(name.to_string(), id.to_string());
        self
    }

    /// Images listed in `in_use` cannot be removed, like images held by a running container.
    pub fn with_images(self, images: &[&str], in_use: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.images = images.iter().map(|i| i.to_string()).collect();
            state.images_in_use = in_use.iter().map(|i| i.to_string()).collect();
        }
        self
    }

    pub fn with_logs(self, name: &str, lines: &[&str]) -> Self {
        self.state.lock().unwrap().logs.insert(
            name.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    pub fn with_pull_delay(mut self, delay: Duration) -> Self {
        self.pull_delay = Some(delay);
        self
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_stop = false;
        state.fail_pull = false;
        state.fail_start = false;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn networks(&self) -> HashMap<String, String> {
        self.state.lock().unwrap().networks.clone()
    }

    pub fn images(&self) -> Vec<String> {
        self.state.lock().unwrap().images.clone()
    }

    pub fn restart_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .restarts
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn running(&self, name: &str) -> Option<FakeContainer> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .filter(|c| c.running)
            .cloned()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn stop_container(&self, name: &str) -> DockerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("stop {}", name));
        if state.fail_stop {
            return Err(DockerError::ClientError("daemon unavailable".to_string()));
        }
        match state.containers.get_mut(name) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(DockerError::NotFound(name.to_string())),
        }
    }

    async fn remove_container(&self, name: &str, force: bool) -> DockerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("remove {}", name));
        let running = match state.containers.get(name) {
            Some(container) => container.running,
            None => return Err(DockerError::NotFound(name.to_string())),
        };
        if running && !force {
            return Err(DockerError::ClientError(format!("container {} is running", name)));
        }
        state.containers.remove(name);
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> DockerResult<()> {
        let fail = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("pull {}", image));
            state.fail_pull
        };
        if let Some(delay) = self.pull_delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(DockerError::NotFound(image.to_string()));
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> DockerResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create {}", spec.name));
        if state.containers.contains_key(&spec.name) {
            return Err(DockerError::ClientError(format!(
                "name {} already in use",
                spec.name
            )));
        }
        let id = format!("c{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> DockerResult<()> {
        let mut state = self.state.lock().unwrap();
        let fail_start = state.fail_start;
        let container = state
            .containers
            .values_mut()
            .find(|c| c.id == container_id)
            .ok_or_else(|| DockerError::NotFound(container_id.to_string()))?;
        let name = container.spec.name.clone();
        if !fail_start {
            container.running = true;
        }
        state.calls.push(format!("start {}", name));
        if fail_start {
            return Err(DockerError::ClientError("port already allocated".to_string()));
        }
        Ok(())
    }

    async fn restart_container(&self, name: &str) -> DockerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("restart {}", name));
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| DockerError::NotFound(name.to_string()))?;
        container.running = true;
        *state.restarts.entry(name.to_string()).or_default() += 1;
        Ok(())
    }

    async fn container_logs(&self, name: &str) -> DockerResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        if !state.containers.contains_key(name) {
            return Err(DockerError::NotFound(name.to_string()));
        }
        Ok(state.logs.get(name).cloned().unwrap_or_default())
    }

    async fn create_network(&self, name: &str) -> DockerResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create network {}", name));
        let id = format!("n{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        state.networks.insert(name.to_string(), id.clone());
        Ok(id)
    }

    async fn network_id(&self, name: &str) -> DockerResult<String> {
        self.state
            .lock()
            .unwrap()
            .networks
            .get(name)
            .cloned()
            .ok_or_else(|| DockerError::NotFound(name.to_string()))
    }

    async fn remove_network(&self, name: &str) -> DockerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("remove network {}", name));
        match state.networks.remove(name) {
            Some(_) => Ok(()),
            None => Err(DockerError::NotFound(name.to_string())),
        }
    }

    async fn list_images(&self) -> DockerResult<Vec<String>> {
        Ok(self.state.lock().unwrap().images.clone())
    }

    async fn remove_image(&self, image_id: &str) -> DockerResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("remove image {}", image_id));
        if state.images_in_use.iter().any(|i| i == image_id) {
            return Err(DockerError::ClientError(format!(
                "image {} is being used by running container",
                image_id
            )));
        }
        let before = state.images.len();
        state.images.retain(|i| i != image_id);
        if state.images.len() == before {
            return Err(DockerError::NotFound(image_id.to_string()));
        }
        Ok(vec![image_id.to_string()])
    }

    async fn prune_dangling_images(&self) -> DockerResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("prune images".to_string());
        if state.fail_prune {
            return Err(DockerError::ClientError("a prune operation is already running".to_string()));
        }
        Ok(4096)
    }
}

#[derive(Debug, Clone)]
struct StatusUpdate {
    pipeline_id: String,
    task_id: String,
    status: TaskStatus,
    at: Instant,
}

/// Serves one task and records every status update it receives, with the time it arrived.
#[derive(Debug, Default)]
pub struct FakeControlPlane {
    task: Option<Task>,
    fetch_error: Option<ControlPlaneError>,
    fail_updates: bool,
    stall_on: Option<TaskStatus>,
    fetches: AtomicUsize,
    updates: Mutex<Vec<StatusUpdate>>,
}

impl FakeControlPlane {
    pub fn serving(task: Task) -> Self {
        FakeControlPlane {
            task: Some(task),
            ..Default::default()
        }
    }

    pub fn failing_fetch(err: ControlPlaneError) -> Self {
        FakeControlPlane {
            fetch_error: Some(err),
            ..Default::default()
        }
    }

    pub fn failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    /// Updates carrying `status` are recorded and then never answered.
    pub fn stalling_on(mut self, status: TaskStatus) -> Self {
        self.stall_on = Some(status);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|update| update.status)
            .collect()
    }

    pub fn updates(&self) -> Vec<(String, String, TaskStatus)> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|update| (update.pipeline_id.clone(), update.task_id.clone(), update.status))
            .collect()
    }

    /// When the first update carrying `status` arrived.
    pub fn received_at(&self, status: TaskStatus) -> Option<Instant> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .find(|update| update.status == status)
            .map(|update| update.at)
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn fetch_task_detail(&self, _pipeline_id: &str, task_id: &str) -> ControlPlaneResult<Task> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.fetch_error {
            return Err(err.clone());
        }
        match &self.task {
            Some(task) if task.id == task_id => Ok(task.clone()),
            _ => Err(ControlPlaneError::Status(404)),
        }
    }

    async fn update_task_status(
        &self,
        pipeline_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> ControlPlaneResult<()> {
        self.updates.lock().unwrap().push(StatusUpdate {
            pipeline_id: pipeline_id.to_string(),
            task_id: task_id.to_string(),
            status,
            at: Instant::now(),
        });
        if self.stall_on == Some(status) {
            std::future::pending::<()>().await;
        }
        if self.fail_updates {
            return Err(ControlPlaneError::Network("connection reset".to_string()));
        }
        Ok(())
    }
}
