//! Deployment orchestrator
//!
//! Runs deploy, redeploy and undeploy sequences for one project at a time,
//! keeping the project record consistent with what is actually running.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::deploy::assembler::{assemble, AssembleOptions};
use crate::deploy::fsm::{transition, DeploymentEvent, DeploymentFsm, FsmSettings};
use crate::deploy::image::{ImageBuilder, ImageOptions};
use crate::deploy::locks::ProjectLocks;
use crate::deploy::progress::ProgressBroadcaster;
use crate::deploy::routing::{route_key, RouteAssigner, RoutingOptions};
use crate::deploy::runtime::{
    ContainerRuntime, ContainerSpec, InspectReport, ResourceLimits, RestartPolicy, StopOutcome,
};
use crate::deploy::scaffold::Scaffold;
use crate::errors::EngineError;
use crate::models::deployment::DeployAction;
use crate::models::project::{DeploymentUpdate, Project, ProjectId, ProjectStatus};
use crate::store::ProjectStore;
use crate::utils::truncate_message;

/// Max length of a failure message in progress events and logs
pub const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// Orchestrator options
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    pub fsm: FsmSettings,
    pub routing: RoutingOptions,
    pub images: ImageOptions,
    pub limits: ResourceLimits,
    pub restart: RestartPolicy,
    pub assemble: AssembleOptions,
}

/// Recorded deployment plus the live container state
#[derive(Debug, Clone)]
pub struct DeploymentStatus {
    pub project: Project,

    /// Present when a container reference is recorded and could be inspected
    pub container: Option<InspectReport>,
}

/// Deployment orchestrator
pub struct Orchestrator {
    store: Arc<dyn ProjectStore>,
    runtime: Arc<dyn ContainerRuntime>,
    images: ImageBuilder,
    routes: RouteAssigner,
    scaffold: Scaffold,
    locks: Arc<ProjectLocks>,
    progress: Arc<ProgressBroadcaster>,
    options: OrchestratorOptions,

    /// Projects with a deploy sequence in flight
    active: Mutex<BTreeSet<ProjectId>>,
}

/// Marks a project as having a sequence in flight until dropped
struct ActiveSequence<'a> {
    active: &'a Mutex<BTreeSet<ProjectId>>,
    id: ProjectId,
}

impl<'a> ActiveSequence<'a> {
    fn start(active: &'a Mutex<BTreeSet<ProjectId>>, id: ProjectId) -> Self {
        active.lock().unwrap_or_else(|e| e.into_inner()).insert(id);
        Self { active, id }
    }
}

impl Drop for ActiveSequence<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        runtime: Arc<dyn ContainerRuntime>,
        locks: Arc<ProjectLocks>,
        progress: Arc<ProgressBroadcaster>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            images: ImageBuilder::new(runtime.clone(), options.images.clone()),
            routes: RouteAssigner::new(options.routing.clone()),
            scaffold: Scaffold::new(&options.images.base_image),
            store,
            runtime,
            locks,
            progress,
            options,
            active: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn progress(&self) -> &Arc<ProgressBroadcaster> {
        &self.progress
    }

    pub fn locks(&self) -> &Arc<ProjectLocks> {
        &self.locks
    }

    /// Check that `action` is currently allowed for the project.
    ///
    /// Used before enqueueing; the sequence itself re-checks under the
    /// project lock.
    pub async fn validate(&self, id: ProjectId, action: DeployAction) -> Result<Project, EngineError> {
        let project = self.store.get(id).await?;
        transition(project.status, &DeploymentEvent::from(action))?;
        Ok(project)
    }

    /// Run an action to completion
    pub async fn execute(&self, id: ProjectId, action: DeployAction) -> Result<Project, EngineError> {
        match action {
            DeployAction::Deploy => self.deploy(id).await,
            DeployAction::Redeploy => self.redeploy(id).await,
            DeployAction::Undeploy => self.undeploy(id).await,
        }
    }

    /// Deploy a ready project
    pub async fn deploy(&self, id: ProjectId) -> Result<Project, EngineError> {
        self.run_deploy(id, DeploymentEvent::Deploy).await
    }

    /// Deploy a deployed or failed project again
    pub async fn redeploy(&self, id: ProjectId) -> Result<Project, EngineError> {
        self.run_deploy(id, DeploymentEvent::Redeploy).await
    }

    /// Tear down a deployed project
    pub async fn undeploy(&self, id: ProjectId) -> Result<Project, EngineError> {
        let _guard = self.locks.acquire(id).await;

        let mut project = self.store.get(id).await?;
        let next = transition(project.status, &DeploymentEvent::Undeploy)?;

        info!("Undeploying project {}", id);
        self.progress.action(id, "Stopping deployment...");

        let reference = if project.has_container() {
            Some(project.container_ref.clone())
        } else {
            project.subdomain.clone()
        };
        if let Some(reference) = reference {
            match self.runtime.stop_and_remove(&reference).await? {
                StopOutcome::Removed => info!("Removed container {} of project {}", reference, id),
                StopOutcome::NotFound => warn!("Container {} of project {} was already gone", reference, id),
            }
        }

        let update = DeploymentUpdate::cleared(next);
        self.store.update_deployment(id, &update).await?;
        update.apply_to(&mut project);

        self.progress.action(id, "Undeployed");
        Ok(project)
    }

    /// Recorded deployment plus live container state
    pub async fn status(&self, id: ProjectId) -> Result<DeploymentStatus, EngineError> {
        let project = self.store.get(id).await?;

        let container = if project.has_container() {
            match self.runtime.inspect(&project.container_ref).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Failed to inspect container of project {}: {}", id, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(DeploymentStatus { project, container })
    }

    /// Projects with a deploy sequence currently running
    pub fn active(&self) -> Vec<ProjectId> {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.iter().copied().collect()
    }

    /// Return every project whose sequence is still running to `ready`.
    ///
    /// Only for shutdown paths that cannot wait for the sequences to end:
    /// it does not take the project locks.
    pub async fn interrupt_active(&self) -> usize {
        let mut interrupted = 0;
        for id in self.active() {
            let project = match self.store.get(id).await {
                Ok(project) if project.status == ProjectStatus::Deploying => project,
                Ok(_) => continue,
                Err(e) => {
                    error!("Failed to read interrupted project {}: {}", id, e);
                    continue;
                }
            };
            match reset_interrupted(
                self.store.as_ref(),
                self.runtime.as_ref(),
                &self.progress,
                &project,
            )
            .await
            {
                Ok(()) => interrupted += 1,
                Err(e) => error!("Failed to reset interrupted project {}: {}", id, e),
            }
        }
        interrupted
    }

    async fn run_deploy(&self, id: ProjectId, start: DeploymentEvent) -> Result<Project, EngineError> {
        let _guard = self.locks.acquire(id).await;

        let project = self.store.get(id).await?;
        let mut fsm = DeploymentFsm::new(project.status);
        fsm.process(start)?;

        self.store
            .update_deployment(id, &DeploymentUpdate::status(fsm.state()))
            .await?;
        let _active = ActiveSequence::start(&self.active, id);
        info!("Deploying project {} ({})", id, project.name);
        self.progress.action(id, "Starting deployment...");

        let max_attempts = self.options.fsm.max_attempts.max(1);

        loop {
            let attempt = fsm.begin_attempt();
            if attempt > 1 {
                self.progress.action(
                    id,
                    &format!("Retrying deployment (attempt {}/{})...", attempt, max_attempts),
                );
            }

            let err = match self.attempt(&project).await {
                Ok(deployed) => {
                    fsm.process(DeploymentEvent::Succeeded)?;
                    info!("Project {} deployed at {}", id, deployed.deployment_url);
                    self.progress
                        .action(id, &format!("Deployed at {}", deployed.deployment_url));
                    return Ok(deployed);
                }
                Err(err) => err,
            };

            let message = truncate_message(&err.to_string(), MAX_ERROR_MESSAGE_CHARS);
            error!("Deployment attempt {} of project {} failed: {}", attempt, id, message);
            self.progress.error(id, &format!("Deployment failed: {}", message));
            fsm.record_failure(&message);

            if err.is_retryable() && fsm.can_retry(max_attempts) {
                warn!(
                    "Retrying project {} in {:?} ({}/{})",
                    id, self.options.fsm.retry_delay, attempt, max_attempts
                );
                tokio::time::sleep(self.options.fsm.retry_delay).await;
                continue;
            }

            let event = if err.is_retryable() {
                DeploymentEvent::RetriesExhausted
            } else {
                DeploymentEvent::Unrecoverable(message)
            };
            let status = fsm.process(event)?;
            self.finish(&project, status).await;
            return Err(err);
        }
    }

    /// One pass of the deploy sequence. On success the record is updated.
    async fn attempt(&self, project: &Project) -> Result<Project, EngineError> {
        let id = project.id;

        self.progress.action(id, "Building app...");
        let context = assemble(project, &self.scaffold, &self.options.assemble);
        let image = self.images.build(id, &context).await?;

        self.progress.action(id, "Configuring routing...");
        let route = self.routes.assign(project);

        // At most one live container per project
        release_containers(self.runtime.as_ref(), project).await?;

        let mut env = BTreeMap::new();
        env.insert("PROJECT_ID".to_string(), id.to_string());
        env.insert("VITE_PROJECT_NAME".to_string(), project.name.clone());

        let spec = ContainerSpec {
            image: image.tag.clone(),
            name: route.key.clone(),
            network: self.routes.options().network.clone(),
            env,
            labels: route.labels.clone(),
            limits: self.options.limits.clone(),
            restart: self.options.restart,
        };
        let container = self.runtime.create_and_start(&spec).await?;

        let update = DeploymentUpdate::deployed(container.as_str(), &route.key, &route.url, Utc::now());
        if let Err(e) = self.store.update_deployment(id, &update).await {
            // Unrecorded containers must not outlive the attempt
            if let Err(stop_err) = self.runtime.stop_and_remove(container.as_str()).await {
                warn!("Failed to remove unrecorded container {}: {}", container, stop_err);
            }
            return Err(e);
        }

        let mut deployed = project.clone();
        update.apply_to(&mut deployed);
        Ok(deployed)
    }

    /// Final status write of a failed sequence. The project leaves with no
    /// container: a project that is not deployed must not stay routed.
    async fn finish(&self, project: &Project, status: ProjectStatus) {
        let update = match release_containers(self.runtime.as_ref(), project).await {
            Ok(()) => DeploymentUpdate::cleared(status),
            Err(e) => {
                // Keep the reference so the next deploy can still find it
                error!(
                    "Failed to remove containers of project {}: {}",
                    project.id, e
                );
                DeploymentUpdate::status(status)
            }
        };

        if let Err(e) = self.store.update_deployment(project.id, &update).await {
            error!(
                "Failed to record status {} for project {}, left to the reconciler: {}",
                status, project.id, e
            );
        }
    }
}

/// Stop every container a project may own: the one named by its route key,
/// then the recorded reference if it points elsewhere
pub(crate) async fn release_containers(
    runtime: &dyn ContainerRuntime,
    project: &Project,
) -> Result<(), EngineError> {
    let key = route_key(&project.owner, &project.name, project.id);
    runtime.stop_and_remove(&key).await?;
    if project.has_container() && project.container_ref != key {
        runtime.stop_and_remove(&project.container_ref).await?;
    }
    Ok(())
}

/// Move a `deploying` project whose sequence is gone back to `ready`,
/// removing whatever the sequence may have started
pub(crate) async fn reset_interrupted(
    store: &dyn ProjectStore,
    runtime: &dyn ContainerRuntime,
    progress: &ProgressBroadcaster,
    project: &Project,
) -> Result<(), EngineError> {
    let next = transition(project.status, &DeploymentEvent::Interrupted)?;
    release_containers(runtime, project).await?;
    store
        .update_deployment(project.id, &DeploymentUpdate::cleared(next))
        .await?;

    warn!("Deployment of project {} was interrupted, marked {}", project.id, next);
    progress.error(project.id, "Deployment interrupted, project returned to ready");
    Ok(())
}
