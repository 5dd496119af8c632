use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::auth::extract::CurrentProject;
use crate::db::models::Notification;
use crate::error::{VigilError, VigilResult};
use crate::notifications as service;

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    unread_only: bool,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
    Query(q): Query<ListQuery>,
) -> VigilResult<Json<Vec<Notification>>> {
    let items = service::list(&state.db, &project_id, q.unread_only, q.limit, q.offset).await?;
    Ok(Json(items))
}

/// Notifications are created only by server-side subsystems (drift
/// scheduler, replay engine); there is no client-authored notification
/// body beyond project scoping, so this endpoint rejects direct creation.
pub async fn create(_auth: CurrentProject) -> VigilResult<StatusCode> {
    Err(VigilError::Validation(
        "notifications are created by the server, not by clients".to_string(),
    ))
}

pub async fn mark_read(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
    Path(id): Path<String>,
) -> VigilResult<StatusCode> {
    service::mark_read(&state.db, &project_id, &id).await?;
    Ok(StatusCode::OK)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
) -> VigilResult<StatusCode> {
    service::mark_all_read(&state.db, &project_id).await?;
    Ok(StatusCode::OK)
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    unread_count: i64,
}

pub async fn unread_count(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
) -> VigilResult<Json<UnreadCountResponse>> {
    let count = service::unread_count(&state.db, &project_id).await?;
    Ok(Json(UnreadCountResponse { unread_count: count }))
}
