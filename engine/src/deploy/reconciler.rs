//! Reconciler
//!
//! Compares projects recorded as deployed with what the container runtime
//! actually runs, and returns projects stuck in deploying to ready once no
//! sequence owns them. It never creates containers.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::deploy::fsm::{transition, DeploymentEvent};
use crate::deploy::locks::ProjectLocks;
use crate::deploy::orchestrator::reset_interrupted;
use crate::deploy::progress::ProgressBroadcaster;
use crate::deploy::runtime::ContainerRuntime;
use crate::errors::EngineError;
use crate::models::project::{DeploymentUpdate, Project, ProjectStatus};
use crate::store::ProjectStore;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Deployed projects whose container was checked
    pub checked: usize,

    /// Projects moved to failed because their container was gone
    pub drifted: usize,

    /// Projects skipped because a deploy or undeploy held them
    pub skipped: usize,

    /// Deploying projects with no running sequence, returned to ready
    pub recovered: usize,
}

/// Detects deployed projects whose container vanished
pub struct Reconciler {
    store: Arc<dyn ProjectStore>,
    runtime: Arc<dyn ContainerRuntime>,
    locks: Arc<ProjectLocks>,
    progress: Arc<ProgressBroadcaster>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        runtime: Arc<dyn ContainerRuntime>,
        locks: Arc<ProjectLocks>,
        progress: Arc<ProgressBroadcaster>,
    ) -> Self {
        Self {
            store,
            runtime,
            locks,
            progress,
        }
    }

    /// Return deploying projects that no sequence holds to ready.
    ///
    /// A sequence holds the project lock for its whole run, so a deploying
    /// record whose lock is free was left behind by a lost status write or a
    /// forced exit.
    pub async fn recover_interrupted(&self) -> Result<SweepReport, EngineError> {
        let mut report = SweepReport::default();
        let projects = self.store.list_by_status(ProjectStatus::Deploying).await?;

        for listed in projects {
            let Some(_guard) = self.locks.try_acquire(listed.id) else {
                report.skipped += 1;
                continue;
            };

            let project = match self.store.get(listed.id).await {
                Ok(project) if project.status == ProjectStatus::Deploying => project,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Failed to re-read project {}: {}", listed.id, e);
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
                Ok(()) => report.recovered += 1,
                Err(e) => warn!("Failed to recover project {}: {}", project.id, e),
            }
        }

        if report.recovered > 0 {
            info!("Recovered {} interrupted deployments", report.recovered);
        }
        Ok(report)
    }

    /// Recover interrupted deployments, then check every deployed project
    pub async fn sweep(&self) -> Result<SweepReport, EngineError> {
        let mut report = self.recover_interrupted().await?;
        let projects = self.store.list_by_status(ProjectStatus::Deployed).await?;
        debug!("Reconciling {} deployed projects", projects.len());

        for listed in projects {
            let Some(_guard) = self.locks.try_acquire(listed.id) else {
                debug!("Project {} is busy, skipping", listed.id);
                report.skipped += 1;
                continue;
            };

            // The listing may be stale by the time the lock is held
            let project = match self.store.get(listed.id).await {
                Ok(project) if project.status == ProjectStatus::Deployed => project,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Failed to re-read project {}: {}", listed.id, e);
                    continue;
                }
            };

            report.checked += 1;
            match self.container_lost(&project).await {
                Ok(false) => {}
                Ok(true) => {
                    if let Err(e) = self.mark_failed(&project).await {
                        warn!("Failed to mark project {} as failed: {}", project.id, e);
                    } else {
                        report.drifted += 1;
                    }
                }
                Err(e) => warn!("Failed to inspect project {}: {}", project.id, e),
            }
        }

        if report.drifted > 0 {
            info!(
                "Reconciler sweep: {} checked, {} drifted, {} skipped",
                report.checked, report.drifted, report.skipped
            );
        }
        Ok(report)
    }

    async fn container_lost(&self, project: &Project) -> Result<bool, EngineError> {
        if !project.has_container() {
            return Ok(true);
        }
        let report = self.runtime.inspect(&project.container_ref).await?;
        Ok(!report.status.exists())
    }

    async fn mark_failed(&self, project: &Project) -> Result<(), EngineError> {
        let next = transition(project.status, &DeploymentEvent::ContainerLost)?;
        self.store
            .update_deployment(project.id, &DeploymentUpdate::status(next))
            .await?;

        warn!(
            "Container {} of project {} is gone, marked {}",
            project.container_ref, project.id, next
        );
        self.progress
            .error(project.id, "Container not found, deployment marked as failed");
        Ok(())
    }
}
