//! Task lifecycle and lookup endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use servsel_core::{build_environment, ReleaseOutcome, Server, ServerName, TaskId};

use crate::api::error::ApiError;
use crate::state::AppState;

/// /v1/tasks
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{task_id}/complete", post(complete))
        .route("/{task_id}/finalize", post(finalize))
        .route("/{task_id}/server", get(get_server))
        .route("/{task_id}/env", get(get_env))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub succeeded: bool,
}

#[derive(Debug, Deserialize)]
pub struct EnvQuery {
    /// Deployment environment the task targets.
    #[serde(default)]
    pub environment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskEnvResponse {
    pub task_id: TaskId,
    pub server: ServerName,
    pub variables: BTreeMap<String, String>,
}

fn task_not_found(task_id: &TaskId) -> ApiError {
    ApiError::not_found(
        "task_not_found",
        format!("task {task_id} holds no server"),
    )
}

async fn complete(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<ReleaseOutcome>, ApiError> {
    let task_id = TaskId::parse(&task_id)?;
    let outcome = state
        .allocator()
        .on_complete(&task_id, request.succeeded)
        .await;
    Ok(Json(outcome))
}

async fn finalize(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ReleaseOutcome>, ApiError> {
    let task_id = TaskId::parse(&task_id)?;
    Ok(Json(state.allocator().on_finalize(&task_id).await))
}

async fn get_server(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Server>, ApiError> {
    let task_id = TaskId::parse(&task_id)?;
    state
        .allocator()
        .resolved_server_for(&task_id)
        .await
        .map(Json)
        .ok_or_else(|| task_not_found(&task_id))
}

async fn get_env(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<EnvQuery>,
) -> Result<Json<TaskEnvResponse>, ApiError> {
    let task_id = TaskId::parse(&task_id)?;
    let resolved = state
        .allocator()
        .resolved_task(&task_id)
        .await
        .ok_or_else(|| task_not_found(&task_id))?;

    let server = resolved.server.ok_or_else(|| {
        ApiError::not_found(
            "server_not_found",
            format!("server {} left inventory", resolved.binding.server),
        )
    })?;

    let variables = build_environment(
        &server,
        resolved.binding.should_deploy,
        query.environment.as_deref(),
        state.env_rules(),
    );

    Ok(Json(TaskEnvResponse {
        task_id,
        server: server.name,
        variables,
    }))
}
