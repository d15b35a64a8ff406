//! Reconciler tests

mod common;

use std::time::Duration;

use shipyard::errors::EngineError;
use shipyard::models::deployment::ProgressKind;
use shipyard::models::project::{Project, ProjectId, ProjectStatus};
use shipyard::workers::reconciler;

use common::{harness, ready_project, Harness};

async fn deployed(h: &Harness, id: u64, name: &str) -> Project {
    h.store.insert(ready_project(id, name));
    h.state.orchestrator.deploy(ProjectId(id)).await.unwrap()
}

#[tokio::test]
async fn test_sweep_marks_lost_container_failed() {
    let h = harness();
    let lost = deployed(&h, 1, "Todo App").await;
    deployed(&h, 2, "Shop").await;
    h.runtime.kill(&lost.container_ref);

    let report = h.state.reconciler.sweep().await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.drifted, 1);
    assert_eq!(report.skipped, 0);

    let stored = h.store.snapshot(ProjectId(1)).unwrap();
    assert_eq!(stored.status, ProjectStatus::Failed);
    // The stale reference stays for diagnosis
    assert_eq!(stored.container_ref, lost.container_ref);
    assert_eq!(
        h.store.snapshot(ProjectId(2)).unwrap().status,
        ProjectStatus::Deployed
    );

    let last = h.state.progress.events(ProjectId(1)).pop().unwrap();
    assert_eq!(last.kind, ProgressKind::Error);
    assert_eq!(last.message, "Container not found, deployment marked as failed");
}

#[tokio::test]
async fn test_sweep_healthy_is_noop() {
    let h = harness();
    deployed(&h, 1, "Todo App").await;
    let writes = h.store.history().len();

    let report = h.state.reconciler.sweep().await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.drifted, 0);
    assert_eq!(h.store.history().len(), writes);
}

#[tokio::test]
async fn test_sweep_deployed_without_reference_is_lost() {
    let h = harness();
    h.store
        .insert(ready_project(3, "Orphan").with_status(ProjectStatus::Deployed));

    let report = h.state.reconciler.sweep().await.unwrap();
    assert_eq!(report.drifted, 1);
    assert_eq!(
        h.store.snapshot(ProjectId(3)).unwrap().status,
        ProjectStatus::Failed
    );
}

#[tokio::test]
async fn test_sweep_skips_locked_project() {
    let h = harness();
    let lost = deployed(&h, 1, "Todo App").await;
    h.runtime.kill(&lost.container_ref);

    let guard = h.state.locks.acquire(ProjectId(1)).await;
    let report = h.state.reconciler.sweep().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.checked, 0);
    assert_eq!(
        h.store.snapshot(ProjectId(1)).unwrap().status,
        ProjectStatus::Deployed
    );

    drop(guard);
    let report = h.state.reconciler.sweep().await.unwrap();
    assert_eq!(report.drifted, 1);
}

#[tokio::test]
async fn test_failed_project_can_be_redeployed() {
    let h = harness();
    let lost = deployed(&h, 1, "Todo App").await;
    h.runtime.kill(&lost.container_ref);
    h.state.reconciler.sweep().await.unwrap();

    let project = h.state.orchestrator.redeploy(ProjectId(1)).await.unwrap();
    assert_eq!(project.status, ProjectStatus::Deployed);
    assert_eq!(h.runtime.running().len(), 1);
}

#[tokio::test]
async fn test_sweep_recovers_interrupted_deploy() {
    let h = harness();
    h.store
        .insert(ready_project(1, "Todo App").with_status(ProjectStatus::Deploying));
    // Started by the sequence that never recorded it
    h.runtime.seed_container("ada-todo-app-1", "shipyard-app-1:abc");

    // Stuck: no command accepts a deploying project
    let err = h.state.orchestrator.deploy(ProjectId(1)).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));
    assert!(h.state.orchestrator.undeploy(ProjectId(1)).await.is_err());

    let report = h.state.reconciler.sweep().await.unwrap();
    assert_eq!(report.recovered, 1);
    assert_eq!(report.checked, 0);

    let stored = h.store.snapshot(ProjectId(1)).unwrap();
    assert_eq!(stored.status, ProjectStatus::Ready);
    assert!(!stored.has_container());
    assert!(h.runtime.running().is_empty());

    let project = h.state.orchestrator.deploy(ProjectId(1)).await.unwrap();
    assert_eq!(project.status, ProjectStatus::Deployed);
    assert_eq!(h.runtime.running().len(), 1);
}

#[tokio::test]
async fn test_recovery_skips_running_sequence() {
    let h = harness();
    h.store
        .insert(ready_project(1, "Todo App").with_status(ProjectStatus::Deploying));

    let guard = h.state.locks.acquire(ProjectId(1)).await;
    let report = h.state.reconciler.recover_interrupted().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.recovered, 0);
    assert_eq!(
        h.store.snapshot(ProjectId(1)).unwrap().status,
        ProjectStatus::Deploying
    );

    drop(guard);
    let report = h.state.reconciler.recover_interrupted().await.unwrap();
    assert_eq!(report.recovered, 1);
}

#[tokio::test]
async fn test_worker_sweeps_until_shutdown() {
    let h = harness();
    let lost = deployed(&h, 1, "Todo App").await;
    h.runtime.kill(&lost.container_ref);

    let options = reconciler::Options {
        interval: Duration::from_secs(3600),
        initial_delay: Duration::ZERO,
    };
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let state = h.state.clone();
    let handle = tokio::spawn(async move {
        reconciler::run(
            &options,
            state.reconciler.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.await;
            }),
        )
        .await;
    });

    let marked = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if h.store.snapshot(ProjectId(1)).map(|p| p.status) == Some(ProjectStatus::Failed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(marked.is_ok());

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
