use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::types::{Acknowledgment, Dispatch, NotificationEvent, WorkerError, WorkerResult};
use crate::lib::control_plane::types::ControlPlane;

/// Accepts task notifications and hands them to the worker.
///
/// Only the task lookup and the enqueue happen on the caller's time; the deployment and
/// all status reporting run later on the worker.
#[derive(Clone)]
pub struct Orchestrator {
    control_plane: Arc<dyn ControlPlane>,
    queue: mpsc::Sender<Dispatch>,
}

impl Orchestrator {
    pub fn new(control_plane: Arc<dyn ControlPlane>, queue: mpsc::Sender<Dispatch>) -> Self {
        Orchestrator {
            control_plane,
            queue,
        }
    }

    pub async fn handle_notification(&self, body: &[u8]) -> Acknowledgment {
        match self.accept(body).await {
            Ok(dispatch_id) => {
                info!(%dispatch_id, "task accepted");
                Acknowledgment::ok()
            }
            Err(e) => {
                warn!(error = %e, "notification rejected");
                e.into()
            }
        }
    }

    async fn accept(&self, body: &[u8]) -> WorkerResult<uuid::Uuid> {
        let event: NotificationEvent = serde_json::from_slice(body)
            .map_err(|e| WorkerError::InvalidNotification(e.to_string()))?;
        let payload = event.payload;

        if payload.pipeline_id.is_empty() || payload.task_id.is_empty() {
            return Err(WorkerError::InvalidNotification(
                "pipelineId and taskId are required".to_string(),
            ));
        }
        info!(pipeline_id = %payload.pipeline_id, task_id = %payload.task_id, "task notification");

        let task = self
            .control_plane
            .fetch_task_detail(&payload.pipeline_id, &payload.task_id)
            .await?;

        let dispatch = Dispatch {
            dispatch_id: uuid::Uuid::new_v4(),
            pipeline_id: payload.pipeline_id,
            task,
            arguments: payload.arguments,
        };
        let dispatch_id = dispatch.dispatch_id;

        self.queue
            .send(dispatch)
            .await
            .map_err(|_| WorkerError::QueueClosed)?;

        Ok(dispatch_id)
    }
}
