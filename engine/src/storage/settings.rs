//! Settings file management

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::app::options::{AppOptions, LifecycleOptions, RecordsOptions, ServerOptions};
use crate::deploy::assembler::AssembleOptions;
use crate::deploy::docker::DockerOptions;
use crate::deploy::fsm::FsmSettings;
use crate::deploy::image::ImageOptions;
use crate::deploy::orchestrator::OrchestratorOptions;
use crate::deploy::progress::ProgressOptions;
use crate::deploy::routing::RoutingOptions;
use crate::deploy::runtime::{ResourceLimits, RestartPolicy};
use crate::errors::EngineError;
use crate::logs::{LogLevel, LogOptions};
use crate::storage::layout::StorageLayout;
use crate::workers::{deployer, reconciler};

/// Engine settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Also log to daily files under the storage layout
    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default)]
    pub records: RecordsSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub routing: RoutingSettings,

    #[serde(default)]
    pub limits: LimitsSettings,

    #[serde(default)]
    pub deploy: DeploySettings,

    #[serde(default)]
    pub images: ImageSettings,

    #[serde(default)]
    pub assets: AssetSettings,

    #[serde(default)]
    pub reconciler: ReconcilerSettings,

    #[serde(default)]
    pub progress: ProgressSettings,
}

fn default_true() -> bool {
    true
}

/// Records API settings
#[derive(Debug, Clone, Deserialize)]
pub struct RecordsSettings {
    /// Base URL of the records API
    #[serde(default = "default_records_url")]
    pub base_url: String,

    /// Bearer token for the records API
    #[serde(default)]
    pub token: Option<SecretString>,

    #[serde(default = "default_records_timeout")]
    pub timeout_secs: u64,
}

fn default_records_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_records_timeout() -> u64 {
    30
}

impl Default for RecordsSettings {
    fn default() -> Self {
        Self {
            base_url: default_records_url(),
            token: None,
            timeout_secs: default_records_timeout(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Public routing settings
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingSettings {
    /// Apps are served at `{route_key}.{base_domain}`
    #[serde(default = "default_base_domain")]
    pub base_domain: String,

    /// `http` or `https`; derived from the base domain when absent
    #[serde(default)]
    pub scheme: Option<String>,

    /// Container network shared with the reverse proxy
    #[serde(default = "default_network")]
    pub network: String,

    #[serde(default = "default_container_port")]
    pub container_port: u16,
}

fn default_base_domain() -> String {
    "localhost".to_string()
}

fn default_network() -> String {
    "shipyard_apps".to_string()
}

fn default_container_port() -> u16 {
    80
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            base_domain: default_base_domain(),
            scheme: None,
            network: default_network(),
            container_port: default_container_port(),
        }
    }
}

/// Per-container resource ceilings
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsSettings {
    #[serde(default = "default_memory")]
    pub memory: String,

    #[serde(default = "default_cpus")]
    pub cpus: f64,

    /// `unless-stopped` or `no`
    #[serde(default)]
    pub restart: RestartPolicy,
}

fn default_memory() -> String {
    "256m".to_string()
}

fn default_cpus() -> f64 {
    0.5
}

impl Default for LimitsSettings {
    fn default() -> Self {
        Self {
            memory: default_memory(),
            cpus: default_cpus(),
            restart: RestartPolicy::default(),
        }
    }
}

/// Deploy sequence settings
#[derive(Debug, Clone, Deserialize)]
pub struct DeploySettings {
    /// Total attempts per deploy, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_max_concurrent_deploys")]
    pub max_concurrent_deploys: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    15
}

fn default_max_concurrent_deploys() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            max_concurrent_deploys: default_max_concurrent_deploys(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Image settings
#[derive(Debug, Clone, Deserialize)]
pub struct ImageSettings {
    #[serde(default = "default_base_image")]
    pub base_image: String,

    #[serde(default = "default_image_prefix")]
    pub prefix: String,

    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,
}

fn default_base_image() -> String {
    "shipyard-base:node20".to_string()
}

fn default_image_prefix() -> String {
    "shipyard-app".to_string()
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            base_image: default_base_image(),
            prefix: default_image_prefix(),
            docker_bin: default_docker_bin(),
        }
    }
}

/// Settings injected into deployed apps
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetSettings {
    /// Records API URL deployed apps call back into
    #[serde(default)]
    pub public_api_url: Option<String>,
}

/// Reconciler settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_reconcile_initial_delay")]
    pub initial_delay_secs: u64,
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_reconcile_initial_delay() -> u64 {
    5
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reconcile_interval(),
            initial_delay_secs: default_reconcile_initial_delay(),
        }
    }
}

/// Progress log settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressSettings {
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

fn default_retention() -> u64 {
    3600
}

fn default_max_events() -> usize {
    200
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            retention_secs: default_retention(),
            max_events: default_max_events(),
        }
    }
}

impl Settings {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        url::Url::parse(&self.records.base_url).map_err(|e| {
            EngineError::ConfigError(format!(
                "records.base_url '{}' is invalid: {}",
                self.records.base_url, e
            ))
        })?;

        if let Some(url) = &self.assets.public_api_url {
            url::Url::parse(url).map_err(|e| {
                EngineError::ConfigError(format!("assets.public_api_url '{}' is invalid: {}", url, e))
            })?;
        }

        if self.routing.base_domain.trim().is_empty() {
            return Err(EngineError::ConfigError(
                "routing.base_domain must not be empty".to_string(),
            ));
        }

        if let Some(scheme) = &self.routing.scheme {
            if scheme != "http" && scheme != "https" {
                return Err(EngineError::ConfigError(format!(
                    "routing.scheme must be http or https, got '{}'",
                    scheme
                )));
            }
        }

        if self.deploy.max_attempts == 0 {
            return Err(EngineError::ConfigError(
                "deploy.max_attempts must be at least 1".to_string(),
            ));
        }

        if !(self.limits.cpus > 0.0) {
            return Err(EngineError::ConfigError(
                "limits.cpus must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Logging options for these settings
    pub fn log_options(&self, layout: &StorageLayout) -> LogOptions {
        LogOptions {
            log_level: self.log_level.clone(),
            json_format: self.log_json,
            log_dir: self.log_to_file.then(|| layout.logs_dir()),
            ..Default::default()
        }
    }

    /// Convert into the typed options tree
    pub fn to_app_options(&self, layout: &StorageLayout) -> AppOptions {
        AppOptions {
            lifecycle: LifecycleOptions::default(),
            layout: layout.clone(),
            records: RecordsOptions {
                base_url: self.records.base_url.clone(),
                token: self.records.token.clone(),
                timeout: Duration::from_secs(self.records.timeout_secs),
            },
            server: ServerOptions {
                host: self.server.host.clone(),
                port: self.server.port,
            },
            orchestrator: OrchestratorOptions {
                fsm: FsmSettings {
                    max_attempts: self.deploy.max_attempts,
                    retry_delay: Duration::from_secs(self.deploy.retry_delay_secs),
                },
                routing: RoutingOptions {
                    base_domain: self.routing.base_domain.clone(),
                    scheme: self.routing.scheme.clone(),
                    network: self.routing.network.clone(),
                    container_port: self.routing.container_port,
                },
                images: ImageOptions {
                    base_image: self.images.base_image.clone(),
                    prefix: self.images.prefix.clone(),
                },
                limits: ResourceLimits {
                    memory: self.limits.memory.clone(),
                    cpus: self.limits.cpus,
                },
                restart: self.limits.restart,
                assemble: AssembleOptions {
                    public_api_url: self.assets.public_api_url.clone(),
                },
            },
            docker: DockerOptions {
                bin: self.images.docker_bin.clone(),
                ..Default::default()
            },
            progress: ProgressOptions {
                retention: Duration::from_secs(self.progress.retention_secs),
                max_events: self.progress.max_events,
                ..Default::default()
            },
            deployer: deployer::Options {
                max_concurrent_deploys: self.deploy.max_concurrent_deploys,
                queue_capacity: self.deploy.queue_capacity,
            },
            enable_reconciler: self.reconciler.enabled,
            reconciler: reconciler::Options {
                interval: Duration::from_secs(self.reconciler.interval_secs),
                initial_delay: Duration::from_secs(self.reconciler.initial_delay_secs),
            },
        }
    }
}
