//! Project store backed by the records API

use std::sync::Arc;

use async_trait::async_trait;
use records_api::{DeploymentPatch, ProjectRecord};
use tracing::warn;

use crate::errors::EngineError;
use crate::http::client::HttpClient;
use crate::models::project::{DeploymentUpdate, Project, ProjectId, ProjectSource, ProjectStatus};
use crate::store::ProjectStore;

/// Convert a records API project into the engine's read model
pub fn project_from_record(record: ProjectRecord) -> Result<Project, EngineError> {
    let status = record.status.parse::<ProjectStatus>()?;
    let source = ProjectSource::parse(&record.frontend_code).unwrap_or_else(|e| {
        warn!(
            "Discarding source of project {}, a placeholder will be deployed: {}",
            record.id, e
        );
        ProjectSource::default()
    });
    Ok(Project {
        id: ProjectId(record.id),
        owner: record.user.username,
        name: record.name,
        description: record.description,
        source,
        status,
        container_ref: record.container_id,
        subdomain: record.subdomain.filter(|s| !s.is_empty()),
        deployment_url: record.deployment_url,
        deployed_at: record.deployed_at,
    })
}

/// Convert a deployment update into its wire patch
pub fn patch_from_update(update: &DeploymentUpdate) -> DeploymentPatch {
    DeploymentPatch {
        status: update.status.map(|s| s.as_str().to_string()),
        container_id: update.container_ref.clone(),
        subdomain: update.subdomain.clone(),
        deployment_url: update.deployment_url.clone(),
        deployed_at: update.deployed_at,
    }
}

/// Project store talking to the records API over HTTP
pub struct RemoteProjectStore {
    http_client: Arc<HttpClient>,
}

impl RemoteProjectStore {
    pub fn new(http_client: Arc<HttpClient>) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl ProjectStore for RemoteProjectStore {
    async fn get(&self, id: ProjectId) -> Result<Project, EngineError> {
        let record = self.http_client.get_project(id.0).await.map_err(|e| match e {
            EngineError::NotFound(_) => EngineError::NotFound(format!("Project {} not found", id)),
            other => other,
        })?;
        project_from_record(record)
    }

    async fn list_by_status(&self, status: ProjectStatus) -> Result<Vec<Project>, EngineError> {
        let records = self.http_client.list_projects(status.as_str()).await?;

        let mut projects = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id;
            match project_from_record(record) {
                // The API filters server-side; keep only what actually matches
                Ok(project) if project.status == status => projects.push(project),
                Ok(_) => {}
                Err(e) => warn!("Skipping project {}: {}", id, e),
            }
        }
        Ok(projects)
    }

    async fn update_deployment(
        &self,
        id: ProjectId,
        update: &DeploymentUpdate,
    ) -> Result<(), EngineError> {
        self.http_client
            .patch_deployment(id.0, &patch_from_update(update))
            .await
    }
}
