//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{stream, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use engine_api::{
    AcceptedResponse, ContainerReport, DeploymentStatusResponse, ErrorResponse, HealthResponse,
    ProgressEventResponse, ProgressEventsResponse, VersionResponse,
};
use tracing::{error, info, warn};

use crate::errors::EngineError;
use crate::models::deployment::{DeployAction, ProgressEvent};
use crate::models::project::ProjectId;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Engine error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self.0 {
            EngineError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            EngineError::InvalidTransition(msg) | EngineError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            other => {
                error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    other.to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: kind.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "shipyard".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

async fn accept(
    state: &ServerState,
    project_id: u64,
    action: DeployAction,
    message: &str,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let id = ProjectId(project_id);
    state.orchestrator.validate(id, action).await?;
    let command = state.queue.enqueue(id, action)?;

    info!("Accepted {} for project {} (job {})", action, id, command.job_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            message: message.to_string(),
            project_id,
            job_id: command.job_id,
        }),
    ))
}

/// Deploy handler
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    accept(&state, project_id, DeployAction::Deploy, "Deployment started").await
}

/// Redeploy handler
pub async fn redeploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    accept(&state, project_id, DeployAction::Redeploy, "Redeployment started").await
}

/// Undeploy handler
pub async fn undeploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    accept(&state, project_id, DeployAction::Undeploy, "Undeployment started").await
}

/// Deployment status handler
pub async fn deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.orchestrator.status(ProjectId(project_id)).await?;
    let project = status.project;

    Ok(Json(DeploymentStatusResponse {
        project_id,
        status: project.status.to_string(),
        deployment_url: project.deployment_url,
        subdomain: project.subdomain,
        deployed_at: project.deployed_at,
        container: status.container.map(|report| ContainerReport {
            status: report.status.as_str().to_string(),
            logs: report.logs,
        }),
    }))
}

/// Progress events handler
pub async fn events_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<u64>,
) -> impl IntoResponse {
    let events = state
        .progress
        .events(ProjectId(project_id))
        .into_iter()
        .map(event_response)
        .collect();

    Json(ProgressEventsResponse { project_id, events })
}

fn event_response(event: ProgressEvent) -> ProgressEventResponse {
    ProgressEventResponse {
        id: event.id,
        kind: event.kind.as_str().to_string(),
        content: event.message,
        timestamp: event.timestamp,
    }
}

/// Live progress events of one project as server-sent events.
///
/// The stream ends when the engine shuts down.
pub async fn events_stream_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<u64>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let id = ProjectId(project_id);
    let receiver = state.progress.subscribe();
    let mut shutdown = state.shutdown.subscribe();

    let events = stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) if event.project_id == id => {
                    let kind = event.kind.as_str();
                    let sse = Event::default()
                        .event(kind)
                        .id(event.id.clone())
                        .json_data(event_response(event));
                    return Some((sse, receiver));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream of project {} lagged by {} events", id, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .take_until(async move {
        let _ = shutdown.recv().await;
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
