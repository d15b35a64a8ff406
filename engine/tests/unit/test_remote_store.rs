//! Records API store tests against a mock server

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shipyard::errors::EngineError;
use shipyard::http::client::HttpClient;
use shipyard::models::project::{DeploymentUpdate, ProjectId, ProjectStatus};
use shipyard::store::remote::RemoteProjectStore;
use shipyard::store::ProjectStore;

fn store(server: &MockServer) -> RemoteProjectStore {
    let client = HttpClient::new(
        &format!("{}/api/", server.uri()),
        Some("records-token".to_string().into()),
        Duration::from_secs(5),
    )
    .unwrap();
    RemoteProjectStore::new(Arc::new(client))
}

fn record(id: u64, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "user": {"id": 3, "username": "ada"},
        "name": "Todo App",
        "description": "Tracks things",
        "status": status,
        "frontend_code": json!({
            "App.tsx": "export default function App() { return <h1>Hi</h1>; }",
            "components": {"Card": "export default function Card() { return null; }"}
        }).to_string(),
        "container_id": "",
        "subdomain": null,
        "deployment_url": "",
        "deployed_at": null
    })
}

#[tokio::test]
async fn test_get_project() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/4/"))
        .and(header("authorization", "Bearer records-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record(4, "ready")))
        .expect(1)
        .mount(&server)
        .await;

    let project = store(&server).get(ProjectId(4)).await.unwrap();
    assert_eq!(project.id, ProjectId(4));
    assert_eq!(project.owner, "ada");
    assert_eq!(project.status, ProjectStatus::Ready);
    assert!(project.source.root.is_some());
    assert!(project.source.components.contains_key("Card"));
    assert!(!project.has_container());
}

#[tokio::test]
async fn test_get_missing_project() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/9/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
        .mount(&server)
        .await;

    let err = store(&server).get(ProjectId(9)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(ref m) if m == "Project 9 not found"));
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/4/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = store(&server).get(ProjectId(4)).await.unwrap_err();
    assert!(matches!(err, EngineError::RecordsError(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_unmanaged_status_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/4/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record(4, "generating")))
        .mount(&server)
        .await;

    let err = store(&server).get(ProjectId(4)).await.unwrap_err();
    assert!(matches!(err, EngineError::ValidationError(_)));
}

#[tokio::test]
async fn test_list_follows_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/"))
        .and(query_param("status", "deployed"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "next": format!("{}/api/projects/?status=deployed&page=2", server.uri()),
            "results": [record(1, "deployed"), record(2, "deployed")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/projects/"))
        .and(query_param("status", "deployed"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "next": null,
            "results": [record(3, "deployed"), record(4, "generating")]
        })))
        .mount(&server)
        .await;

    let projects = store(&server)
        .list_by_status(ProjectStatus::Deployed)
        .await
        .unwrap();
    let ids: Vec<u64> = projects.iter().map(|p| p.id.0).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_update_sends_only_set_fields() {
    let server = MockServer::start().await;
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    Mock::given(method("PATCH"))
        .and(path("/api/projects/4/deployment/"))
        .and(header("authorization", "Bearer records-token"))
        .and(body_json(json!({
            "status": "deployed",
            "container_id": "c0001",
            "subdomain": "ada-todo-app-4",
            "deployment_url": "https://ada-todo-app-4.apps.example.com",
            "deployed_at": at
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/projects/4/deployment/"))
        .and(body_json(json!({"status": "deploying"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server);
    store
        .update_deployment(ProjectId(4), &DeploymentUpdate::status(ProjectStatus::Deploying))
        .await
        .unwrap();
    store
        .update_deployment(
            ProjectId(4),
            &DeploymentUpdate::deployed(
                "c0001",
                "ada-todo-app-4",
                "https://ada-todo-app-4.apps.example.com",
                at,
            ),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_failure_surfaces() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/projects/4/deployment/"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad status"))
        .mount(&server)
        .await;

    let err = store(&server)
        .update_deployment(ProjectId(4), &DeploymentUpdate::cleared(ProjectStatus::Ready))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("bad status"));
}

#[tokio::test]
async fn test_update_accepts_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/projects/4/deployment/"))
        .and(body_json(json!({"status": "ready"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result = store(&server)
        .update_deployment(ProjectId(4), &DeploymentUpdate::status(ProjectStatus::Ready))
        .await;
    assert!(result.is_ok(), "{:?}", result);
}
