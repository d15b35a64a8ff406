//! Deployment worker
//!
//! HTTP handlers only validate and enqueue; this worker drains the queue and
//! runs each command through the orchestrator off the request path.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::deploy::orchestrator::Orchestrator;
use crate::errors::EngineError;
use crate::models::deployment::DeployAction;
use crate::models::project::ProjectId;
use crate::utils::generate_uuid;

/// Deployer worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sequences running at the same time
    pub max_concurrent_deploys: usize,

    /// Commands buffered before enqueueing is refused
    pub queue_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_concurrent_deploys: 4,
            queue_capacity: 256,
        }
    }
}

/// A queued deployment command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployCommand {
    pub job_id: String,
    pub project_id: ProjectId,
    pub action: DeployAction,
}

/// Sending side of the deployment queue
#[derive(Debug, Clone)]
pub struct DeployQueue {
    tx: mpsc::Sender<DeployCommand>,
}

impl DeployQueue {
    /// Create a queue and the receiver the worker drains
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DeployCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a command without waiting
    pub fn enqueue(
        &self,
        project_id: ProjectId,
        action: DeployAction,
    ) -> Result<DeployCommand, EngineError> {
        let command = DeployCommand {
            job_id: generate_uuid(),
            project_id,
            action,
        };

        self.tx.try_send(command.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                EngineError::ServerError("Deployment queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                EngineError::ShutdownError("Deployment queue is closed".to_string())
            }
        })?;

        debug!(
            "Enqueued {} for project {} (job {})",
            command.action, command.project_id, command.job_id
        );
        Ok(command)
    }
}

/// Run the deployer worker
pub async fn run(
    options: &Options,
    orchestrator: Arc<Orchestrator>,
    mut queue: mpsc::Receiver<DeployCommand>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Deployer worker starting...");

    let permits = Arc::new(Semaphore::new(options.max_concurrent_deploys.max(1)));
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Deployer worker shutting down...");
                break;
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!("Deployment task panicked: {}", e);
                }
            }
            command = queue.recv() => {
                let Some(command) = command else {
                    info!("Deployment queue closed");
                    break;
                };

                let permit = tokio::select! {
                    _ = &mut shutdown_signal => {
                        warn!("Dropping job {} on shutdown", command.job_id);
                        break;
                    }
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let orchestrator = orchestrator.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    execute(orchestrator.as_ref(), command).await;
                });
            }
        }
    }

    if !tasks.is_empty() {
        info!("Waiting for {} in-flight deployments...", tasks.len());
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Deployment task panicked: {}", e);
        }
    }
}

async fn execute(orchestrator: &Orchestrator, command: DeployCommand) {
    info!(
        "Running {} for project {} (job {})",
        command.action, command.project_id, command.job_id
    );

    match orchestrator.execute(command.project_id, command.action).await {
        Ok(project) => info!(
            "Job {} finished: project {} is {}",
            command.job_id, project.id, project.status
        ),
        Err(e) if e.is_user_facing() => warn!("Job {} rejected: {}", command.job_id, e),
        Err(e) => error!("Job {} failed: {}", command.job_id, e),
    }
}
