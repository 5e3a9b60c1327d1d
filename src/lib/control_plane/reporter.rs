use std::sync::Arc;

use tracing::{debug, warn};

use super::types::ControlPlane;
use crate::lib::tasks::types::TaskStatus;

/// Best-effort delivery of status transitions to the control plane.
#[derive(Clone)]
pub struct StatusReporter {
    control_plane: Arc<dyn ControlPlane>,
}

impl StatusReporter {
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        StatusReporter { control_plane }
    }

    /// Sends one update. Failures are logged and dropped, never retried.
    pub async fn report(&self, pipeline_id: &str, task_id: &str, status: TaskStatus) -> bool {
        match self
            .control_plane
            .update_task_status(pipeline_id, task_id, status)
            .await
        {
            Ok(()) => {
                debug!(pipeline_id, task_id, %status, "status reported");
                true
            }
            Err(e) => {
                warn!(pipeline_id, task_id, %status, error = %e, "failed to report task status");
                false
            }
        }
    }
}
