//! Error types for the Shipyard engine

use thiserror::Error;

/// Main error type for the Shipyard engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Toolchain or compile error while building an image
    #[error("Build failed: {0}")]
    BuildFailure(String),

    /// The runtime could not create or start a container (resource
    /// exhaustion, name collision, engine unavailable)
    #[error("Container start failed: {0}")]
    RuntimeStartFailure(String),

    /// Any other container runtime command failure (stop, inspect, tag)
    #[error("Container runtime error: {0}")]
    RuntimeError(String),

    #[error("Records API error: {0}")]
    RecordsError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the orchestrator may retry the whole deploy sequence after this
    /// error. Build failures are included: the sequence is retried as a whole
    /// even though the builder itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::IoError(_)
                | EngineError::HttpError(_)
                | EngineError::BuildFailure(_)
                | EngineError::RuntimeStartFailure(_)
                | EngineError::RuntimeError(_)
                | EngineError::RecordsError(_)
        )
    }

    /// Errors caused by the caller rather than by the engine
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidTransition(_)
                | EngineError::ValidationError(_)
                | EngineError::NotFound(_)
        )
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}
