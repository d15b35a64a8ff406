//! Server state

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::deploy::orchestrator::Orchestrator;
use crate::deploy::progress::ProgressBroadcaster;
use crate::workers::deployer::DeployQueue;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub queue: DeployQueue,
    pub progress: Arc<ProgressBroadcaster>,

    /// Fires when the engine shuts down; ends open event streams
    pub shutdown: broadcast::Sender<()>,
}

impl ServerState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        queue: DeployQueue,
        progress: Arc<ProgressBroadcaster>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            orchestrator,
            queue,
            progress,
            shutdown,
        }
    }

    /// Use the engine's shutdown channel
    pub fn with_shutdown(mut self, shutdown: broadcast::Sender<()>) -> Self {
        self.shutdown = shutdown;
        self
    }
}
