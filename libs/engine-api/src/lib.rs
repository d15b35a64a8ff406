//! Engine HTTP API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Acknowledgement for a queued deploy, redeploy or undeploy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub message: String,
    pub project_id: u64,
    pub job_id: String,
}

/// Live container state attached to a status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerReport {
    pub status: String,
    #[serde(default)]
    pub logs: String,
}

/// Deployment status of a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatusResponse {
    pub project_id: u64,
    pub status: String,
    pub deployment_url: String,
    pub subdomain: Option<String>,
    pub deployed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerReport>,
}

/// One progress message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEventResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Ordered progress messages for a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEventsResponse {
    pub project_id: u64,
    pub events: Vec<ProgressEventResponse>,
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}
