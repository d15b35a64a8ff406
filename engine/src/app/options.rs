//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::docker::DockerOptions;
use crate::deploy::orchestrator::OrchestratorOptions;
use crate::deploy::progress::ProgressOptions;
use crate::storage::layout::StorageLayout;
use crate::workers::{deployer, reconciler};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Records API connection
    pub records: RecordsOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Deploy sequence configuration
    pub orchestrator: OrchestratorOptions,

    /// Progress log configuration
    pub progress: ProgressOptions,

    /// Container runtime configuration
    pub docker: DockerOptions,

    /// Deployer worker options
    pub deployer: deployer::Options,

    /// Enable the drift reconciler
    pub enable_reconciler: bool,

    /// Reconciler worker options
    pub reconciler: reconciler::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout: StorageLayout::default(),
            records: RecordsOptions::default(),
            server: ServerOptions::default(),
            orchestrator: OrchestratorOptions::default(),
            progress: ProgressOptions::default(),
            docker: DockerOptions::default(),
            deployer: deployer::Options::default(),
            enable_reconciler: true,
            reconciler: reconciler::Options::default(),
        }
    }
}

/// Lifecycle options for the engine
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Records API options
#[derive(Debug, Clone)]
pub struct RecordsOptions {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

impl Default for RecordsOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
