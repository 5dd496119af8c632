use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::auth::extract::CurrentProject;
use crate::db::models::Span;
use crate::error::VigilResult;
use crate::query;

#[derive(Deserialize)]
pub struct ListSpansQuery {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    trace_id: Option<String>,
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Serialize)]
pub struct SpanPageResponse {
    items: Vec<Span>,
    total: i64,
}

pub async fn list(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
    Query(q): Query<ListSpansQuery>,
) -> VigilResult<Json<SpanPageResponse>> {
    let (items, total) = query::list_spans(
        &state.db,
        &project_id,
        q.kind,
        q.status,
        q.trace_id,
        q.offset.unwrap_or(0),
        q.limit.unwrap_or(50),
    )
    .await?;
    Ok(Json(SpanPageResponse { items, total }))
}
