//! Main application run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::deploy::orchestrator::Orchestrator;
use crate::errors::EngineError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::deployer::{self, DeployCommand, DeployQueue};
use crate::workers::reconciler;

/// Time given to interrupted deployments to record their state before a
/// forced exit
const INTERRUPT_GRACE: Duration = Duration::from_secs(5);

/// Run the deployment engine
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), EngineError> {
    info!("Initializing Shipyard...");

    let app_state = match AppState::init(&options).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            return Err(e);
        }
    };

    run_with_state(options, app_state, shutdown_signal).await
}

/// Run the engine around an already initialized state
pub async fn run_with_state(
    options: AppOptions,
    app_state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), EngineError> {
    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(
        shutdown_tx.clone(),
        options.lifecycle.clone(),
        app_state.orchestrator.clone(),
    );

    if let Err(e) = init(&options, app_state, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start Shipyard: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), EngineError> {
    // Deployments cut off by a previous run
    match app_state.reconciler.recover_interrupted().await {
        Ok(report) if report.recovered > 0 => {
            info!("Returned {} interrupted deployments to ready", report.recovered)
        }
        Ok(_) => {}
        Err(e) => warn!("Failed to recover interrupted deployments: {}", e),
    }

    let (queue, queue_rx) = DeployQueue::new(options.deployer.queue_capacity);

    init_deployer_worker(
        options.deployer.clone(),
        app_state.clone(),
        queue_rx,
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    if options.enable_reconciler {
        init_reconciler_worker(
            options.reconciler.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    init_server(options, app_state, queue, shutdown_manager, shutdown_tx).await
}

fn init_deployer_worker(
    options: deployer::Options,
    app_state: Arc<AppState>,
    queue_rx: mpsc::Receiver<DeployCommand>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), EngineError> {
    info!("Initializing deployer worker...");

    let orchestrator = app_state.orchestrator.clone();

    let deployer_handle = tokio::spawn(async move {
        deployer::run(
            &options,
            orchestrator,
            queue_rx,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_deployer_worker_handle(deployer_handle)
}

fn init_reconciler_worker(
    options: reconciler::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), EngineError> {
    info!("Initializing reconciler worker...");

    let reconciler_handle = tokio::spawn(async move {
        reconciler::run(
            &options,
            app_state.reconciler.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_reconciler_worker_handle(reconciler_handle)
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    queue: DeployQueue,
    shutdown_manager: &mut ShutdownManager,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), EngineError> {
    let mut shutdown_rx = shutdown_tx.subscribe();
    info!("Initializing HTTP server...");

    let server_state = ServerState::new(
        app_state.orchestrator.clone(),
        queue,
        app_state.progress.clone(),
    )
    .with_shutdown(shutdown_tx.clone());

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    orchestrator: Arc<Orchestrator>,
    server_handle: Option<JoinHandle<Result<(), EngineError>>>,
    deployer_worker_handle: Option<JoinHandle<()>>,
    reconciler_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(
        shutdown_tx: broadcast::Sender<()>,
        lifecycle_options: LifecycleOptions,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            orchestrator,
            server_handle: None,
            deployer_worker_handle: None,
            reconciler_worker_handle: None,
        }
    }

    pub fn with_deployer_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), EngineError> {
        if self.deployer_worker_handle.is_some() {
            return Err(EngineError::ShutdownError("deployer_handle already set".to_string()));
        }
        self.deployer_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_reconciler_worker_handle(
        &mut self,
        handle: JoinHandle<()>,
    ) -> Result<(), EngineError> {
        if self.reconciler_worker_handle.is_some() {
            return Err(EngineError::ShutdownError("reconciler_handle already set".to_string()));
        }
        self.reconciler_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), EngineError>>,
    ) -> Result<(), EngineError> {
        if self.server_handle.is_some() {
            return Err(EngineError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                // Running sequences die with the process; their projects
                // must not stay deploying
                match tokio::time::timeout(INTERRUPT_GRACE, self.orchestrator.interrupt_active())
                    .await
                {
                    Ok(count) => warn!("Interrupted {} running deployments", count),
                    Err(_) => error!("Timed out recording interrupted deployments"),
                }
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), EngineError> {
        info!("Shutting down Shipyard...");

        // 1. Stop accepting commands
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| EngineError::ShutdownError(e.to_string()))??;
        }

        // 2. Reconciler worker
        if let Some(handle) = self.reconciler_worker_handle.take() {
            handle.await.map_err(|e| EngineError::ShutdownError(e.to_string()))?;
        }

        // 3. Deployer worker, waits for in-flight sequences
        if let Some(handle) = self.deployer_worker_handle.take() {
            handle.await.map_err(|e| EngineError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
