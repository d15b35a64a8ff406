//! Project models
//!
//! The records layer owns projects. The engine reads identity and generated
//! source and writes back only the deployment fields in [`DeploymentUpdate`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Identifier of a project record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub u64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ProjectId {
    fn from(id: u64) -> Self {
        ProjectId(id)
    }
}

/// Deployment status of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    /// Generated and deployable, nothing running
    Ready,

    /// A deploy sequence is in flight
    Deploying,

    /// A container is serving the project
    Deployed,

    /// The deployment is broken (unrecoverable error or container lost)
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Ready => "ready",
            ProjectStatus::Deploying => "deploying",
            ProjectStatus::Deployed => "deployed",
            ProjectStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ready" => Ok(ProjectStatus::Ready),
            "deploying" => Ok(ProjectStatus::Deploying),
            "deployed" => Ok(ProjectStatus::Deployed),
            "failed" => Ok(ProjectStatus::Failed),
            other => Err(EngineError::ValidationError(format!(
                "Project status '{}' is not managed by the deployment engine",
                other
            ))),
        }
    }
}

/// Generated frontend source of a project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSource {
    /// Root component (`App.tsx`)
    pub root: Option<String>,

    /// Component name -> component source
    pub components: BTreeMap<String, String>,
}

impl ProjectSource {
    /// Parse the source tree stored by the generator.
    ///
    /// Accepts `{"App.tsx": "...", "components": {"Name": "..."}}` either as a
    /// JSON object or serialized into a JSON string. Null and blank strings are
    /// an empty source, which the assembler replaces with a placeholder app.
    /// Any other non-empty value is rejected.
    pub fn parse(value: &serde_json::Value) -> Result<Self, EngineError> {
        match value {
            serde_json::Value::Object(map) => {
                let root = map
                    .get("App.tsx")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string);

                let components = map
                    .get("components")
                    .and_then(|v| v.as_object())
                    .map(|c| {
                        c.iter()
                            .filter_map(|(name, code)| {
                                code.as_str().map(|code| (name.clone(), code.to_string()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                Ok(Self { root, components })
            }
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::String(raw) if raw.trim().is_empty() => Ok(Self::default()),
            serde_json::Value::String(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(parsed @ serde_json::Value::Object(_)) => Self::parse(&parsed),
                Ok(_) => Err(EngineError::ValidationError(
                    "generated source is not an object".to_string(),
                )),
                Err(e) => Err(EngineError::ValidationError(format!(
                    "generated source is not valid JSON: {}",
                    e
                ))),
            },
            other => Err(EngineError::ValidationError(format!(
                "generated source has unexpected type: {}",
                other
            ))),
        }
    }

    /// Whether there is nothing usable to build
    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.components.is_empty()
    }
}

/// Read model of a project, as seen by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,

    /// Owner identity (username)
    pub owner: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub source: ProjectSource,

    pub status: ProjectStatus,

    /// Runtime reference of the live container, empty when not running
    #[serde(default)]
    pub container_ref: String,

    /// Route key assigned on the last successful deploy
    #[serde(default)]
    pub subdomain: Option<String>,

    #[serde(default)]
    pub deployment_url: String,

    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
}

impl Project {
    /// A ready project with no source and no deployment
    pub fn new(id: impl Into<ProjectId>, owner: &str, name: &str) -> Self {
        Self {
            id: id.into(),
            owner: owner.to_string(),
            name: name.to_string(),
            description: String::new(),
            source: ProjectSource::default(),
            status: ProjectStatus::Ready,
            container_ref: String::new(),
            subdomain: None,
            deployment_url: String::new(),
            deployed_at: None,
        }
    }

    pub fn with_source(mut self, source: ProjectSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_status(mut self, status: ProjectStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether a container reference is recorded
    pub fn has_container(&self) -> bool {
        !self.container_ref.is_empty()
    }
}

/// Write-back of deployment fields. `None` leaves a field untouched;
/// `Some(String::new())` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentUpdate {
    pub status: Option<ProjectStatus>,
    pub container_ref: Option<String>,
    pub subdomain: Option<String>,
    pub deployment_url: Option<String>,
    pub deployed_at: Option<DateTime<Utc>>,
}

impl DeploymentUpdate {
    /// Status-only update
    pub fn status(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Successful deployment
    pub fn deployed(container_ref: &str, route_key: &str, url: &str, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(ProjectStatus::Deployed),
            container_ref: Some(container_ref.to_string()),
            subdomain: Some(route_key.to_string()),
            deployment_url: Some(url.to_string()),
            deployed_at: Some(at),
        }
    }

    /// Status change that also clears the container reference and URL
    pub fn cleared(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
            container_ref: Some(String::new()),
            deployment_url: Some(String::new()),
            ..Default::default()
        }
    }

    /// Apply the update to an in-memory project
    pub fn apply_to(&self, project: &mut Project) {
        if let Some(status) = self.status {
            project.status = status;
        }
        if let Some(container_ref) = &self.container_ref {
            project.container_ref = container_ref.clone();
        }
        if let Some(subdomain) = &self.subdomain {
            project.subdomain = Some(subdomain.clone());
        }
        if let Some(url) = &self.deployment_url {
            project.deployment_url = url.clone();
        }
        if let Some(at) = self.deployed_at {
            project.deployed_at = Some(at);
        }
    }
}
