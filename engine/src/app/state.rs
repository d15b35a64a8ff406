//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::docker::DockerCli;
use crate::deploy::locks::ProjectLocks;
use crate::deploy::orchestrator::Orchestrator;
use crate::deploy::progress::ProgressBroadcaster;
use crate::deploy::reconciler::Reconciler;
use crate::deploy::runtime::ContainerRuntime;
use crate::errors::EngineError;
use crate::http::client::HttpClient;
use crate::store::remote::RemoteProjectStore;
use crate::store::ProjectStore;

/// Main application state
pub struct AppState {
    /// Project records
    pub store: Arc<dyn ProjectStore>,

    /// Container runtime
    pub runtime: Arc<dyn ContainerRuntime>,

    /// Per-project locks shared by the orchestrator and the reconciler
    pub locks: Arc<ProjectLocks>,

    /// Deployment progress log
    pub progress: Arc<ProgressBroadcaster>,

    pub orchestrator: Arc<Orchestrator>,

    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Initialize application state against the records API and docker
    pub async fn init(options: &AppOptions) -> Result<Self, EngineError> {
        info!("Initializing application state...");

        options.layout.setup().await?;

        let http_client = Arc::new(HttpClient::new(
            &options.records.base_url,
            options.records.token.clone(),
            options.records.timeout,
        )?);
        let store: Arc<dyn ProjectStore> = Arc::new(RemoteProjectStore::new(http_client));
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(options.docker.clone()));

        Ok(Self::new(options, store, runtime))
    }

    /// Wire the state around an existing store and runtime
    pub fn new(
        options: &AppOptions,
        store: Arc<dyn ProjectStore>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        let locks = Arc::new(ProjectLocks::new());
        let progress = Arc::new(ProgressBroadcaster::new(options.progress.clone()));

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            runtime.clone(),
            locks.clone(),
            progress.clone(),
            options.orchestrator.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            runtime.clone(),
            locks.clone(),
            progress.clone(),
        ));

        Self {
            store,
            runtime,
            locks,
            progress,
            orchestrator,
            reconciler,
        }
    }
}
