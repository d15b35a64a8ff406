//! Container runtime adapter
//!
//! The orchestrator and reconciler only see [`ContainerRuntime`]. The handle is
//! built once at startup and injected as `Arc<dyn ContainerRuntime>`.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::deploy::assembler::BuildContext;
use crate::errors::EngineError;

/// Runtime-assigned identifier of a container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerRef(pub String);

impl ContainerRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContainerRef {
    fn from(s: &str) -> Self {
        ContainerRef(s.to_string())
    }
}

/// Per-container resource ceilings
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    /// Memory limit in runtime notation (e.g. `256m`)
    pub memory: String,

    /// CPU share (0.5 = half a core)
    pub cpus: f64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory: "256m".to_string(),
            cpus: 0.5,
        }
    }
}

/// Restart policy of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart
    No,

    /// Restart on crash, but never after an explicit stop
    #[default]
    UnlessStopped,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

/// Everything needed to create and start a container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub image: String,

    /// Container name (the route key)
    pub name: String,

    pub network: String,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub limits: ResourceLimits,
    pub restart: RestartPolicy,
}

/// Result of a stop-and-remove request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The container existed and is gone now
    Removed,

    /// There was nothing to remove
    NotFound,
}

/// Observed container state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Restarting,
    Exited,
    Created,
    Paused,

    /// The runtime has no such container
    NotFound,

    /// Anything else the runtime reports
    Other(String),
}

impl ContainerStatus {
    pub fn parse(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "running" => ContainerStatus::Running,
            "restarting" => ContainerStatus::Restarting,
            "exited" | "dead" => ContainerStatus::Exited,
            "created" => ContainerStatus::Created,
            "paused" => ContainerStatus::Paused,
            other => ContainerStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContainerStatus::Running => "running",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Created => "created",
            ContainerStatus::Paused => "paused",
            ContainerStatus::NotFound => "not_found",
            ContainerStatus::Other(s) => s,
        }
    }

    pub fn exists(&self) -> bool {
        *self != ContainerStatus::NotFound
    }
}

/// Live container state plus recent output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectReport {
    pub status: ContainerStatus,
    pub logs: String,
}

impl InspectReport {
    pub fn not_found() -> Self {
        Self {
            status: ContainerStatus::NotFound,
            logs: String::new(),
        }
    }
}

/// Container runtime trait
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether an image with this tag is present locally
    async fn image_exists(&self, tag: &str) -> Result<bool, EngineError>;

    /// Build an image from the context, reusing layers from `cache_from`
    async fn build_image(
        &self,
        context: &BuildContext,
        tag: &str,
        cache_from: Option<&str>,
    ) -> Result<(), EngineError>;

    /// Point `target` at the image `source`
    async fn tag_image(&self, source: &str, target: &str) -> Result<(), EngineError>;

    /// Create and start a container
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<ContainerRef, EngineError>;

    /// Stop and remove a container by id or name. Absence is success.
    async fn stop_and_remove(&self, reference: &str) -> Result<StopOutcome, EngineError>;

    /// Report container state and the tail of its logs
    async fn inspect(&self, reference: &str) -> Result<InspectReport, EngineError>;
}
