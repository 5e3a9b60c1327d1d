use std::collections::HashMap;

use tokio::sync::Mutex;

use super::types::TaskStatus;

pub fn valid_status_transition(src: &TaskStatus, dst: &TaskStatus) -> bool {
    if src.is_terminal() {
        return false;
    }

    let status_transition_map: HashMap<TaskStatus, Vec<TaskStatus>> = {
        let mut map = HashMap::new();
        map.insert(TaskStatus::Pending, vec![TaskStatus::InProgress]);
        map.insert(
            TaskStatus::InProgress,
            vec![TaskStatus::Done, TaskStatus::Failed, TaskStatus::TimedOut],
        );
        map.insert(TaskStatus::Done, vec![]);
        map.insert(TaskStatus::Failed, vec![]);
        map.insert(TaskStatus::TimedOut, vec![]);
        map
    };

    if let Some(valid_statuses) = status_transition_map.get(src) {
        valid_statuses.contains(dst)
    } else {
        false
    }
}

/// Status of a single dispatch, shared by the deploy path and the timeout path.
///
/// Each path must `claim` a status before reporting it. A claim only succeeds for a
/// valid transition, so once a terminal status is claimed every later claim fails and
/// the control plane sees exactly one terminal report.
#[derive(Debug)]
pub struct StatusLedger {
    current: Mutex<TaskStatus>,
}

impl StatusLedger {
    pub fn new() -> Self {
        StatusLedger {
            current: Mutex::new(TaskStatus::Pending),
        }
    }

    pub async fn claim(&self, next: TaskStatus) -> bool {
        let mut current = self.current.lock().await;
        if !valid_status_transition(&current, &next) {
            return false;
        }
        *current = next;
        true
    }

    pub async fn current(&self) -> TaskStatus {
        *self.current.lock().await
    }
}

impl Default for StatusLedger {
    fn default() -> Self {
        Self::new()
    }
}
