//! Project records API client

use records_api::{DeploymentPatch, ProjectList, ProjectRecord};

use crate::errors::EngineError;
use crate::http::client::HttpClient;

/// Upper bound on pages followed when listing projects
const MAX_PAGES: usize = 100;

impl HttpClient {
    /// Get a project record
    pub async fn get_project(&self, project_id: u64) -> Result<ProjectRecord, EngineError> {
        let path = format!("/projects/{}/", project_id);
        self.get(&path, &[]).await
    }

    /// List project records with a status, following pagination
    pub async fn list_projects(&self, status: &str) -> Result<Vec<ProjectRecord>, EngineError> {
        let mut results = Vec::new();
        let mut page = 1usize;

        loop {
            let page_param = page.to_string();
            let list: ProjectList = self
                .get(
                    "/projects/",
                    &[("status", status), ("page", page_param.as_str())],
                )
                .await?;
            results.extend(list.results);

            if list.next.is_none() || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }

        Ok(results)
    }

    /// Write deployment fields of a project
    pub async fn patch_deployment(
        &self,
        project_id: u64,
        patch: &DeploymentPatch,
    ) -> Result<(), EngineError> {
        let path = format!("/projects/{}/deployment/", project_id);
        self.patch_no_content(&path, patch).await
    }
}
