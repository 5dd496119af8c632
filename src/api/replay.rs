use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::AppState;
use crate::auth::extract::CurrentProject;
use crate::db::models::ReplayRun;
use crate::error::VigilResult;
use crate::replay;

#[derive(Deserialize)]
pub struct EstimateRequest {
    #[serde(default)]
    mutations: HashMap<String, Value>,
}

pub async fn estimate(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
    Path(trace_id): Path<String>,
    Json(req): Json<EstimateRequest>,
) -> VigilResult<Json<ReplayRun>> {
    let result = replay::estimate(&state.db, &project_id, &trace_id, req.mutations).await?;
    Ok(Json(result.run))
}

pub async fn confirm(
    State(state): State<AppState>,
    _auth: CurrentProject,
    Path((_trace_id, run_id)): Path<(String, String)>,
) -> VigilResult<Json<ReplayRun>> {
    let run = replay::confirm(state.db.clone(), state.hub.clone(), state.encryptor.clone(), &run_id).await?;
    Ok(Json(run))
}

pub async fn cancel(
    State(state): State<AppState>,
    _auth: CurrentProject,
    Path((_trace_id, run_id)): Path<(String, String)>,
) -> VigilResult<Json<ReplayRun>> {
    let run = replay::cancel(&state.db, &run_id).await?;
    Ok(Json(run))
}

pub async fn status(
    State(state): State<AppState>,
    _auth: CurrentProject,
    Path((_trace_id, run_id)): Path<(String, String)>,
) -> VigilResult<Json<ReplayRun>> {
    let run = state.db.get_replay_run(&run_id).await?;
    Ok(Json(run))
}

#[derive(serde::Serialize)]
pub struct DiffResponse {
    original_trace_id: String,
    mutations: Value,
    diffs: Value,
}

pub async fn diff(
    State(state): State<AppState>,
    _auth: CurrentProject,
    Path((_trace_id, run_id)): Path<(String, String)>,
) -> VigilResult<Json<DiffResponse>> {
    let view = replay::diff(&state.db, &run_id).await?;
    Ok(Json(DiffResponse {
        original_trace_id: view.original_trace_id,
        mutations: view.mutations,
        diffs: view.diffs,
    }))
}
