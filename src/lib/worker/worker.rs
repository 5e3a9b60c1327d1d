use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinSet};
use tracing::{Instrument, error, info, info_span, warn};

use super::{timeout, types::Dispatch};
use crate::lib::{
    control_plane::reporter::StatusReporter,
    tasks::{
        deployer::{ContainerDeployer, DeployError},
        state::StatusLedger,
        types::TaskStatus,
    },
};

/// Single consumer of the dispatch queue.
///
/// Every dispatch runs on its own task inside a `JoinSet`, so the worker sees each one
/// finish. When the queue closes the worker waits for the in-flight dispatches and returns.
pub struct Worker {
    pub name: String,
    queue: mpsc::Receiver<Dispatch>,
    deployer: Arc<ContainerDeployer>,
    reporter: StatusReporter,
    pub dispatch_count: u64,
}

impl Worker {
    pub fn new(
        name: &str,
        queue: mpsc::Receiver<Dispatch>,
        deployer: Arc<ContainerDeployer>,
        reporter: StatusReporter,
    ) -> Self {
        Worker {
            name: name.to_string(),
            queue,
            deployer,
            reporter,
            dispatch_count: 0,
        }
    }

    pub async fn run_tasks(mut self) -> u64 {
        let mut running: JoinSet<(String, TaskStatus)> = JoinSet::new();
        info!(worker = %self.name, "worker started");

        loop {
            tokio::select! {
                next = self.queue.recv() => match next {
                    Some(dispatch) => {
                        self.dispatch_count += 1;
                        let span = info_span!(
                            "dispatch",
                            dispatch_id = %dispatch.dispatch_id,
                            pipeline_id = %dispatch.pipeline_id,
                            task_id = %dispatch.task.id,
                            task_name = %dispatch.task.name,
                        );
                        let deployer = self.deployer.clone();
                        let reporter = self.reporter.clone();
                        running.spawn(
                            async move {
                                let task_id = dispatch.task.id.clone();
                                let status = execute_dispatch(dispatch, deployer, reporter).await;
                                (task_id, status)
                            }
                            .instrument(span),
                        );
                    }
                    None => break,
                },
                Some(finished) = running.join_next() => log_finished(finished),
            }
        }

        info!(worker = %self.name, in_flight = running.len(), "queue closed, draining");
        while let Some(finished) = running.join_next().await {
            log_finished(finished);
        }
        info!(worker = %self.name, dispatched = self.dispatch_count, "worker stopped");
        self.dispatch_count
    }
}

fn log_finished(finished: Result<(String, TaskStatus), tokio::task::JoinError>) {
    match finished {
        Ok((task_id, status)) => info!(%task_id, %status, "dispatch finished"),
        Err(e) => error!(error = %e, "dispatch task aborted"),
    }
}

/// Runs one task from `InProgress` to its terminal status and returns that status.
///
/// The timeout is armed once `InProgress` is claimed, before it is reported. The deploy path
/// and the timeout path both go through the ledger; whichever claims a terminal status first
/// reports it and the other is dropped.
pub async fn execute_dispatch(
    dispatch: Dispatch,
    deployer: Arc<ContainerDeployer>,
    reporter: StatusReporter,
) -> TaskStatus {
    let Dispatch {
        pipeline_id,
        task,
        arguments,
        ..
    } = dispatch;
    let ledger = Arc::new(StatusLedger::new());
    let in_progress = ledger.claim(TaskStatus::InProgress).await;

    // armed before the InProgress report goes out, so a stalled report cannot hold it back
    let mut timer = task.timeout().map(|duration| {
        let ledger = ledger.clone();
        let reporter = reporter.clone();
        let pipeline_id = pipeline_id.clone();
        let task_id = task.id.clone();
        timeout::arm(duration, async move {
            if ledger.claim(TaskStatus::TimedOut).await {
                warn!(%pipeline_id, %task_id, ?duration, "task timed out");
                reporter
                    .report(&pipeline_id, &task_id, TaskStatus::TimedOut)
                    .await;
            }
        })
    });

    if in_progress {
        reporter
            .report(&pipeline_id, &task.id, TaskStatus::InProgress)
            .await;
    }

    if !arguments.is_empty() || !task.arguments.is_empty() {
        info!(?arguments, task_arguments = ?task.arguments, "task arguments");
    }

    let result = match task.deployment_config() {
        Ok(config) => deployer.deploy(&config).await,
        Err(e) => Err(DeployError::from(e)),
    };

    if let Some(timer) = timer.as_mut() {
        timer.cancel();
    }

    let terminal = match &result {
        Ok(outcome) => {
            info!(container_id = %outcome.container_id, image = %outcome.image, "deploy succeeded");
            TaskStatus::Done
        }
        Err(e) => {
            error!(step = e.step(), error = %e, "deploy failed");
            TaskStatus::Failed
        }
    };

    if ledger.claim(terminal).await {
        reporter.report(&pipeline_id, &task.id, terminal).await;
    } else {
        warn!(status = %terminal, "terminal status already reported, dropping");
    }

    // a timeout report may still be in flight
    if let Some(timer) = timer {
        timer.wait().await;
    }

    ledger.current().await
}
