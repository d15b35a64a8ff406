//! Wire models for the project records API.
//!
//! The records service owns projects; the engine reads a project's identity
//! and generated source and patches back only its deployment fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owner of a project as embedded in a project record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    pub id: u64,
    pub username: String,
}

/// A project as returned by `GET /projects/{id}/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: u64,
    pub user: UserRef,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: String,

    /// Generated frontend source. Either a JSON object
    /// `{"App.tsx": "...", "components": {"Name": "..."}}` or that object
    /// serialized into a string.
    #[serde(default)]
    pub frontend_code: serde_json::Value,

    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub deployment_url: String,
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
}

/// Paginated project listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectList {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<ProjectRecord>,
}

/// Partial update of deployment fields, sent as
/// `PATCH /projects/{id}/deployment/`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
}
