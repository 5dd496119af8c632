use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AppState;
use crate::auth::extract::CurrentProject;
use crate::db::models::{Span, Trace};
use crate::error::VigilResult;
use crate::{ingest, query};

#[derive(Serialize)]
pub struct IngestResponse {
    trace_id: String,
    span_count: usize,
}

pub async fn ingest_batch(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
    Json(batch): Json<ingest::IngestBatch>,
) -> VigilResult<(StatusCode, Json<IngestResponse>)> {
    let result = ingest::ingest(&state.db, &project_id, batch).await?;
    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            trace_id: result.trace_id,
            span_count: result.span_count,
        }),
    ))
}

#[derive(Deserialize)]
pub struct ListTracesQuery {
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    end_date: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct TracePageResponse {
    items: Vec<Trace>,
    total: i64,
}

pub async fn list(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
    Query(q): Query<ListTracesQuery>,
) -> VigilResult<Json<TracePageResponse>> {
    let (items, total) = query::list_traces(
        &state.db,
        &project_id,
        q.status,
        q.start_date,
        q.end_date,
        q.offset.unwrap_or(0),
        q.limit.unwrap_or(50),
    )
    .await?;
    Ok(Json(TracePageResponse { items, total }))
}

#[derive(Serialize)]
pub struct TraceDetailResponse {
    #[serde(flatten)]
    trace: Trace,
    spans: Vec<Span>,
}

pub async fn get_one(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
    Path(id): Path<String>,
) -> VigilResult<Json<TraceDetailResponse>> {
    let detail = query::get_trace_detail(&state.db, &project_id, &id).await?;
    Ok(Json(TraceDetailResponse {
        trace: detail.trace,
        spans: detail.spans,
    }))
}

#[derive(Deserialize)]
pub struct PatchTraceRequest {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

pub async fn patch_one(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
    Path(id): Path<String>,
    Json(req): Json<PatchTraceRequest>,
) -> VigilResult<Json<Trace>> {
    let trace = query::patch_trace(&state.db, &project_id, &id, req.status, req.metadata).await?;
    Ok(Json(trace))
}

#[derive(Deserialize)]
pub struct AppendEventRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    attributes: Value,
}

pub async fn append_event(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
    Path((id, span_id)): Path<(String, String)>,
    Json(req): Json<AppendEventRequest>,
) -> VigilResult<(StatusCode, Json<Span>)> {
    let span = query::append_event(&state.db, &project_id, &id, &span_id, req.name, req.attributes).await?;
    Ok((StatusCode::CREATED, Json(span)))
}
