//! Download handlers - task creation, lookup, cancellation and history.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;

use civdl_core::{DownloadRequest, TaskId, TaskView};
use civdl_download::ActiveCount;

use crate::error::HttpError;
use crate::state::AppState;

/// Response from clearing finished downloads.
#[derive(Debug, Serialize)]
pub struct ClearHistoryResponse {
    /// Number of terminal tasks removed.
    pub removed: usize,
}

/// A malformed id cannot name an existing task.
fn parse_id(raw: &str) -> Result<TaskId, HttpError> {
    raw.parse()
        .map_err(|_| HttpError::NotFound(format!("Download not found: {raw}")))
}

/// Resolve and enqueue a new download.
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<TaskView>, HttpError> {
    let view = state.manager.create(req).await?;
    tracing::info!(
        target: "civdl.http",
        id = %view.task.id,
        file = %view.task.filename,
        "Download queued"
    );
    Ok(Json(view))
}

/// All tasks, running first, then queued by age, then finished newest first.
pub async fn list(State(state): State<AppState>) -> Json<Vec<TaskView>> {
    let tasks = state.manager.list();
    tracing::debug!(target: "civdl.http", count = tasks.len(), "Task list returned");
    Json(tasks)
}

/// Get a single task.
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, HttpError> {
    let id = parse_id(&id)?;
    Ok(Json(state.manager.get(id)?))
}

/// Cancel a download. Already-finished tasks are returned unchanged.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, HttpError> {
    let id = parse_id(&id)?;
    Ok(Json(state.manager.cancel(id).await?))
}

/// Cancel if still running, then remove the task.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, HttpError> {
    let id = parse_id(&id)?;
    state.manager.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Remove every finished task.
pub async fn clear_history(State(state): State<AppState>) -> Json<ClearHistoryResponse> {
    let removed = state.manager.clear_history();
    Json(ClearHistoryResponse { removed })
}

/// Cheap count of unfinished tasks, for pollers choosing a refresh cadence.
pub async fn active_count(State(state): State<AppState>) -> Json<ActiveCount> {
    Json(state.manager.active_count().await)
}
