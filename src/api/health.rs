//! Liveness/readiness probes — `/ready` additionally exercises the DB
//! connection (`SELECT 1`), which is what distinguishes it from `/health`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    state
        .db
        .run("readiness check", |conn| conn.query_row("SELECT 1", [], |_| Ok(())))
        .await
        .map(|_| Json(json!({ "status": "ready" })))
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}
