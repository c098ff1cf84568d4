use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use taskrelay_core::ports::StoreError;
use taskrelay_core::{RelayError, TaskId, TaskRecord, TaskSpec};
use tracing::info;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Serialize)]
pub struct Created {
    pub id: TaskId,
}

fn parse_id(raw: &str) -> ApiResult<TaskId> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("task id must be an integer, got {raw:?}")))
}

/// POST /api/v1/tasks
pub async fn create_task(
    State(state): State<AppState>,
    Json(spec): Json<TaskSpec>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    if spec.method.trim().is_empty() || spec.url.trim().is_empty() {
        return Err(ApiError::BadRequest("method and url are required".into()));
    }
    let id = state.orchestrator.create_task(spec).await?;
    info!(task_id = %id, "task accepted");
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// GET /api/v1/tasks
pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<Vec<TaskRecord>>> {
    Ok(Json(state.orchestrator.get_all_tasks().await?))
}

/// DELETE /api/v1/tasks
pub async fn clean_tasks(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.orchestrator.clean_storage().await?;
    info!("store cleaned");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<TaskRecord>> {
    let id = parse_id(&raw)?;
    Ok(Json(state.orchestrator.get_task_by_id(id).await?))
}

/// DELETE /api/v1/tasks/{id}
///
/// Deleting a task a worker still holds is allowed; the worker's later
/// status write then misses and is only logged.
pub async fn delete_task(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&raw)?;
    match state.orchestrator.delete_task_by_id(id).await? {
        0 => Err(RelayError::from(StoreError::NotFound(id)).into()),
        _ => {
            info!(task_id = %id, "task deleted");
            Ok(StatusCode::NO_CONTENT)
        }
    }
}
