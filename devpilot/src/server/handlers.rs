//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::deploy::config::DeploymentConfig;
use crate::deploy::lifecycle::LifecycleOperation;
use crate::errors::{FieldError, PilotError};
use crate::orchestrator::Caller;
use crate::projects::model::Project;
use crate::server::state::ServerState;
use crate::stream::StreamBody;
use crate::utils::version_info;

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
        service: "devpilot".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Projects response
#[derive(Debug, Serialize)]
pub struct ProjectsResponse {
    pub projects: Vec<Project>,
    pub total: usize,
}

pub async fn list_projects_handler(
    State(state): State<Arc<ServerState>>,
    caller: Caller,
) -> Result<Json<ProjectsResponse>, PilotError> {
    let projects = state.orchestrator.list_projects(&caller).await?;
    let total = projects.len();
    Ok(Json(ProjectsResponse { projects, total }))
}

pub async fn get_project_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    caller: Caller,
) -> Result<Json<Project>, PilotError> {
    let project = state.orchestrator.authorize(&id, &caller).await?;
    Ok(Json(project))
}

/// Deploy handler. Rejections are JSON; an accepted deploy answers with the live stream.
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    caller: Caller,
    payload: Result<Json<DeploymentConfig>, JsonRejection>,
) -> Result<StreamBody, PilotError> {
    let Json(config) = payload.map_err(|rejection| {
        PilotError::ValidationError(vec![FieldError::new("body", rejection.body_text())])
    })?;
    state.orchestrator.start_deploy(config, &caller).await
}

pub async fn redeploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    caller: Caller,
) -> Result<StreamBody, PilotError> {
    state.orchestrator.start_redeploy(&id, &caller).await
}

pub async fn start_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    caller: Caller,
) -> Result<StreamBody, PilotError> {
    operation(&state, LifecycleOperation::Start, &id, &caller).await
}

pub async fn stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    caller: Caller,
) -> Result<StreamBody, PilotError> {
    operation(&state, LifecycleOperation::Stop, &id, &caller).await
}

pub async fn restart_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    caller: Caller,
) -> Result<StreamBody, PilotError> {
    operation(&state, LifecycleOperation::Restart, &id, &caller).await
}

pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    caller: Caller,
) -> Result<StreamBody, PilotError> {
    operation(&state, LifecycleOperation::Logs, &id, &caller).await
}

pub async fn delete_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    caller: Caller,
) -> Result<StreamBody, PilotError> {
    operation(&state, LifecycleOperation::Delete, &id, &caller).await
}

async fn operation(
    state: &ServerState,
    operation: LifecycleOperation,
    id: &str,
    caller: &Caller,
) -> Result<StreamBody, PilotError> {
    state
        .orchestrator
        .start_operation(operation, id, caller)
        .await
}
