//! FSM unit tests

use shipyard::deploy::fsm::{transition, DeploymentEvent, DeploymentFsm};
use shipyard::errors::EngineError;
use shipyard::models::deployment::DeployAction;
use shipyard::models::project::ProjectStatus;
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new(ProjectStatus::Ready);
    assert_eq!(fsm.state(), ProjectStatus::Ready);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.attempts(), 0);
}

#[test]
fn test_fsm_deploy_success_flow() {
    let mut fsm = DeploymentFsm::new(ProjectStatus::Ready);

    // Ready -> Deploying
    assert_ok!(fsm.process(DeploymentEvent::Deploy));
    assert_eq!(fsm.state(), ProjectStatus::Deploying);

    // Deploying -> Deployed
    fsm.begin_attempt();
    fsm.process(DeploymentEvent::Succeeded).unwrap();
    assert_eq!(fsm.state(), ProjectStatus::Deployed);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_retries_exhausted_returns_to_ready() {
    let mut fsm = DeploymentFsm::new(ProjectStatus::Ready);
    fsm.process(DeploymentEvent::Deploy).unwrap();

    fsm.begin_attempt();
    fsm.record_failure("build failed");
    assert!(fsm.can_retry(2));

    fsm.begin_attempt();
    fsm.record_failure("build failed again");
    assert!(!fsm.can_retry(2));

    fsm.process(DeploymentEvent::RetriesExhausted).unwrap();
    assert_eq!(fsm.state(), ProjectStatus::Ready);
    assert_eq!(fsm.error(), Some("build failed again"));
    assert_eq!(fsm.attempts(), 2);
}

#[test]
fn test_fsm_unrecoverable_fails() {
    let mut fsm = DeploymentFsm::new(ProjectStatus::Deployed);
    fsm.process(DeploymentEvent::Redeploy).unwrap();
    fsm.begin_attempt();

    fsm.process(DeploymentEvent::Unrecoverable("invalid route".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), ProjectStatus::Failed);
    assert_eq!(fsm.error(), Some("invalid route"));
    assert!(!fsm.can_retry(5));
}

#[test]
fn test_fsm_redeploy_resets_bookkeeping() {
    let mut fsm = DeploymentFsm::new(ProjectStatus::Failed);
    fsm.record_failure("old");

    fsm.process(DeploymentEvent::Redeploy).unwrap();
    assert_eq!(fsm.state(), ProjectStatus::Deploying);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.attempts(), 0);
}

#[test]
fn test_transition_table() {
    use DeploymentEvent as E;
    use ProjectStatus as S;

    let allowed = [
        (S::Ready, E::Deploy, S::Deploying),
        (S::Deployed, E::Redeploy, S::Deploying),
        (S::Failed, E::Redeploy, S::Deploying),
        (S::Deploying, E::Succeeded, S::Deployed),
        (S::Deploying, E::RetriesExhausted, S::Ready),
        (S::Deploying, E::Unrecoverable("x".to_string()), S::Failed),
        (S::Deployed, E::Undeploy, S::Ready),
        (S::Deployed, E::ContainerLost, S::Failed),
        (S::Deploying, E::Interrupted, S::Ready),
    ];
    for (from, event, to) in allowed {
        assert_eq!(transition(from, &event).unwrap(), to, "{:?} on {}", event, from);
    }

    let rejected = [
        (S::Ready, E::Redeploy),
        (S::Ready, E::Undeploy),
        (S::Ready, E::Succeeded),
        (S::Deploying, E::Deploy),
        (S::Deploying, E::Undeploy),
        (S::Deployed, E::Deploy),
        (S::Failed, E::Deploy),
        (S::Failed, E::Undeploy),
        (S::Failed, E::ContainerLost),
        (S::Failed, E::Interrupted),
    ];
    for (from, event) in rejected {
        assert!(
            matches!(transition(from, &event), Err(EngineError::InvalidTransition(_))),
            "{:?} on {} should be rejected",
            event,
            from
        );
    }
}

#[test]
fn test_fsm_invalid_transition_messages() {
    let err = transition(ProjectStatus::Deployed, &DeploymentEvent::Deploy).unwrap_err();
    assert_eq!(
        err.to_string(),
        EngineError::InvalidTransition("Project is already deployed".to_string()).to_string()
    );

    let err = transition(ProjectStatus::Ready, &DeploymentEvent::Undeploy).unwrap_err();
    assert!(err.to_string().contains("Project is not deployed"));

    let err = transition(ProjectStatus::Deploying, &DeploymentEvent::Redeploy).unwrap_err();
    assert!(err.to_string().contains("already in progress"));
}

#[test]
fn test_fsm_invalid_transition_keeps_state() {
    let mut fsm = DeploymentFsm::new(ProjectStatus::Ready);
    assert_err!(fsm.process(DeploymentEvent::Undeploy));
    assert_eq!(fsm.state(), ProjectStatus::Ready);
}

#[test]
fn test_actions_map_to_events() {
    assert_eq!(DeploymentEvent::from(DeployAction::Deploy), DeploymentEvent::Deploy);
    assert_eq!(DeploymentEvent::from(DeployAction::Redeploy), DeploymentEvent::Redeploy);
    assert_eq!(DeploymentEvent::from(DeployAction::Undeploy), DeploymentEvent::Undeploy);
}
