//! Finite State Machine for project deployment

use std::time::Duration;

use crate::errors::EngineError;
use crate::models::deployment::DeployAction;
use crate::models::project::ProjectStatus;

/// FSM settings
#[derive(Debug, Clone)]
pub struct FsmSettings {
    /// Total attempts of the deploy sequence, including the first one
    pub max_attempts: u32,

    /// Fixed delay between attempts
    pub retry_delay: Duration,
}

impl Default for FsmSettings {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_secs(15),
        }
    }
}

/// Deployment event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentEvent {
    /// Start deployment of a ready project
    Deploy,

    /// Start deployment of an already deployed (or failed) project
    Redeploy,

    /// Deployment completed successfully
    Succeeded,

    /// Every attempt failed with a retryable error
    RetriesExhausted,

    /// An attempt failed with an error that retrying cannot fix
    Unrecoverable(String),

    /// Tear down a deployed project
    Undeploy,

    /// The reconciler found the container gone
    ContainerLost,

    /// The sequence that owned a deploying project is gone
    Interrupted,
}

impl From<DeployAction> for DeploymentEvent {
    fn from(action: DeployAction) -> Self {
        match action {
            DeployAction::Deploy => DeploymentEvent::Deploy,
            DeployAction::Redeploy => DeploymentEvent::Redeploy,
            DeployAction::Undeploy => DeploymentEvent::Undeploy,
        }
    }
}

/// The single transition table for project status
pub fn transition(
    state: ProjectStatus,
    event: &DeploymentEvent,
) -> Result<ProjectStatus, EngineError> {
    use DeploymentEvent as E;
    use ProjectStatus as S;

    let next = match (state, event) {
        (S::Ready, E::Deploy) => S::Deploying,
        (S::Deployed, E::Redeploy) | (S::Failed, E::Redeploy) => S::Deploying,

        (S::Deploying, E::Succeeded) => S::Deployed,
        (S::Deploying, E::RetriesExhausted) => S::Ready,
        (S::Deploying, E::Unrecoverable(_)) => S::Failed,
        (S::Deploying, E::Interrupted) => S::Ready,

        (S::Deployed, E::Undeploy) => S::Ready,
        (S::Deployed, E::ContainerLost) => S::Failed,

        (state, event) => return Err(invalid(state, event)),
    };

    Ok(next)
}

fn invalid(state: ProjectStatus, event: &DeploymentEvent) -> EngineError {
    let reason = match (state, event) {
        (ProjectStatus::Deployed, DeploymentEvent::Deploy) => {
            "Project is already deployed".to_string()
        }
        (ProjectStatus::Deploying, _) => "A deployment is already in progress".to_string(),
        (_, DeploymentEvent::Undeploy) => "Project is not deployed".to_string(),
        (_, DeploymentEvent::Deploy) => "Project must be in ready state to deploy".to_string(),
        (_, DeploymentEvent::Redeploy) => {
            "Project must be deployed or failed to redeploy".to_string()
        }
        (state, event) => format!("{:?} is not valid in state {}", event, state),
    };
    EngineError::InvalidTransition(reason)
}

/// Deployment FSM for one deploy sequence.
///
/// Tracks the status plus attempt bookkeeping; every status change goes
/// through [`transition`].
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: ProjectStatus,
    error: Option<String>,
    attempts: u32,
}

impl DeploymentFsm {
    /// Create an FSM at the given status
    pub fn new(state: ProjectStatus) -> Self {
        Self {
            state,
            error: None,
            attempts: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> ProjectStatus {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Attempts started in this sequence
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<ProjectStatus, EngineError> {
        let next = transition(self.state, &event)?;
        match &event {
            DeploymentEvent::Deploy | DeploymentEvent::Redeploy => {
                self.error = None;
                self.attempts = 0;
            }
            DeploymentEvent::Succeeded => self.error = None,
            DeploymentEvent::Unrecoverable(err) => self.error = Some(err.clone()),
            _ => {}
        }
        self.state = next;
        Ok(next)
    }

    /// Count the start of an attempt
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Remember the last attempt's failure
    pub fn record_failure(&mut self, error: &str) {
        self.error = Some(error.to_string());
    }

    /// Check if another attempt is allowed
    pub fn can_retry(&self, max_attempts: u32) -> bool {
        self.state == ProjectStatus::Deploying && self.attempts < max_attempts
    }
}
