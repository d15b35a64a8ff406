//! Deployment models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::project::ProjectId;

/// A command an external collaborator can request for a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployAction {
    Deploy,
    Redeploy,
    Undeploy,
}

impl fmt::Display for DeployAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeployAction::Deploy => "deploy",
            DeployAction::Redeploy => "redeploy",
            DeployAction::Undeploy => "undeploy",
        };
        f.write_str(s)
    }
}

/// Kind of a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    /// A step of a deploy/undeploy sequence
    Action,

    /// A failure message
    Error,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::Action => "action",
            ProgressKind::Error => "error",
        }
    }
}

/// A timestamped progress message for a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// `{project_id}_deploy_{seq}`
    pub id: String,
    pub project_id: ProjectId,
    pub kind: ProgressKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
