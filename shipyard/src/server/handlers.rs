//! HTTP request handlers

use std::convert::Infallible;
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
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{error, warn};

use crate::deploy::{AppReference, CreateApplicationRequest, DeployOptions};
use crate::errors::ShipyardError;
use crate::models::{Application, Deployment, DeploymentLog};
use crate::server::state::ServerState;
use crate::sink::{sse::error_line, CaptureSink, LogSink, MultiSink, SseSink};
use crate::utils::version_info;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ShipyardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ShipyardError::Validation(_) => StatusCode::BAD_REQUEST,
            ShipyardError::Access(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ShipyardError::ResourceConflict(_) => StatusCode::CONFLICT,
            ShipyardError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ShipyardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
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

/// Register and provision a new application
pub async fn create_stack_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<Application>), ShipyardError> {
    let capture = CaptureSink::new();
    let app = state
        .orchestrator
        .create_application(request, &capture)
        .await
        .inspect_err(|e| warn!("Application creation failed: {}\n{}", e, capture.transcript()))?;
    Ok((StatusCode::CREATED, Json(app)))
}

pub async fn get_stack_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<i64>,
) -> Result<Json<Application>, ShipyardError> {
    state
        .store
        .get_application(id)
        .await?
        .map(Json)
        .ok_or_else(|| ShipyardError::NotFound(format!("application {}", id)))
}

pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Deployment>>, ShipyardError> {
    if state.store.get_application(id).await?.is_none() {
        return Err(ShipyardError::NotFound(format!("application {}", id)));
    }
    Ok(Json(state.store.list_deployments(id).await?))
}

/// Deploy an application, streaming the log as server-sent events.
///
/// The deployment runs in its own task so it completes even if the client
/// disconnects. Failures end the stream with an `__ERROR__:` line.
pub async fn deploy_stack_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<i64>,
    Json(options): Json<DeployOptions>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ShipyardError> {
    if state.store.get_application(id).await?.is_none() {
        return Err(ShipyardError::NotFound(format!("application {}", id)));
    }

    let (sse, rx) = SseSink::channel();
    let orchestrator = state.orchestrator.clone();

    tokio::spawn(async move {
        let capture = CaptureSink::new();
        let sink = MultiSink::default()
            .with(Arc::new(sse))
            .with(Arc::new(capture.clone()));

        let deployment_id = match orchestrator
            .deploy_application(&AppReference::Id(id), options, &sink)
            .await
        {
            Ok(deployment_id) => Some(deployment_id),
            Err(failure) => {
                sink.emit(&error_line(&failure.error.to_string()));
                failure.deployment_id
            }
        };

        if let Some(deployment_id) = deployment_id {
            if let Err(e) = orchestrator
                .save_transcript(deployment_id, capture.transcript())
                .await
            {
                error!("Failed to save log of deployment {}: {}", deployment_id, e);
            }
        }
    });

    Ok(log_event_stream(rx, KeepAlive::default()))
}

/// One event per log line, with keep-alive comments while a step is silent
fn log_event_stream<S>(
    lines: S,
    keep_alive: KeepAlive,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = String> + Send + 'static,
{
    Sse::new(lines.map(|line| Ok::<_, Infallible>(Event::default().data(line))))
        .keep_alive(keep_alive)
}

pub async fn deployment_log_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeploymentLog>, ShipyardError> {
    state
        .store
        .get_deployment_log(id)
        .await?
        .map(Json)
        .ok_or_else(|| ShipyardError::NotFound(format!("log of deployment {}", id)))
}
