//! Project record access
//!
//! The records layer is the source of truth for projects. Everything the
//! engine reads or writes about a project goes through [`ProjectStore`].

pub mod memory;
pub mod remote;

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::models::project::{DeploymentUpdate, Project, ProjectId, ProjectStatus};

/// Project store trait
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Read a project. Unknown ids are [`EngineError::NotFound`].
    async fn get(&self, id: ProjectId) -> Result<Project, EngineError>;

    /// All projects currently recorded with `status`
    async fn list_by_status(&self, status: ProjectStatus) -> Result<Vec<Project>, EngineError>;

    /// Write deployment fields of a project
    async fn update_deployment(
        &self,
        id: ProjectId,
        update: &DeploymentUpdate,
    ) -> Result<(), EngineError>;
}
