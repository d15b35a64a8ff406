//! In-memory project store

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::models::project::{DeploymentUpdate, Project, ProjectId, ProjectStatus};
use crate::store::ProjectStore;

/// Project store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<BTreeMap<ProjectId, Project>>,
    history: RwLock<Vec<(ProjectId, DeploymentUpdate)>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a project
    pub fn insert(&self, project: Project) {
        let mut projects = self.projects.write().unwrap_or_else(|e| e.into_inner());
        projects.insert(project.id, project);
    }

    /// Current copy of a project
    pub fn snapshot(&self, id: ProjectId) -> Option<Project> {
        let projects = self.projects.read().unwrap_or_else(|e| e.into_inner());
        projects.get(&id).cloned()
    }

    /// Every update applied so far, oldest first
    pub fn history(&self) -> Vec<(ProjectId, DeploymentUpdate)> {
        let history = self.history.read().unwrap_or_else(|e| e.into_inner());
        history.clone()
    }

    /// Statuses written for a project, oldest first
    pub fn status_history(&self, id: ProjectId) -> Vec<ProjectStatus> {
        self.history()
            .into_iter()
            .filter(|(pid, _)| *pid == id)
            .filter_map(|(_, update)| update.status)
            .collect()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn get(&self, id: ProjectId) -> Result<Project, EngineError> {
        self.snapshot(id)
            .ok_or_else(|| EngineError::NotFound(format!("Project {} not found", id)))
    }

    async fn list_by_status(&self, status: ProjectStatus) -> Result<Vec<Project>, EngineError> {
        let projects = self.projects.read().unwrap_or_else(|e| e.into_inner());
        Ok(projects
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect())
    }

    async fn update_deployment(
        &self,
        id: ProjectId,
        update: &DeploymentUpdate,
    ) -> Result<(), EngineError> {
        {
            let mut projects = self.projects.write().unwrap_or_else(|e| e.into_inner());
            let project = projects
                .get_mut(&id)
                .ok_or_else(|| EngineError::NotFound(format!("Project {} not found", id)))?;
            update.apply_to(project);
        }

        let mut history = self.history.write().unwrap_or_else(|e| e.into_inner());
        history.push((id, update.clone()));
        Ok(())
    }
}
