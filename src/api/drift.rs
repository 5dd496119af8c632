use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::auth::extract::{CurrentProject, GuestProject};
use crate::db::models::DriftAlert;
use crate::error::VigilResult;

#[derive(Deserialize)]
pub struct ListAlertsQuery {
    #[serde(default)]
    include_resolved: bool,
}

pub async fn list_alerts(
    State(state): State<AppState>,
    GuestProject(project_id): GuestProject,
    Query(q): Query<ListAlertsQuery>,
) -> VigilResult<Json<Vec<DriftAlert>>> {
    let alerts = state.db.list_drift_alerts(&project_id, q.include_resolved).await?;
    Ok(Json(alerts))
}

#[derive(Serialize)]
pub struct DriftSummaryResponse {
    total_alerts: usize,
    unresolved: usize,
    by_severity: std::collections::HashMap<String, usize>,
    recent_alerts: Vec<DriftAlert>,
}

pub async fn summary(
    State(state): State<AppState>,
    GuestProject(project_id): GuestProject,
) -> VigilResult<Json<DriftSummaryResponse>> {
    let alerts = state.db.list_drift_alerts(&project_id, true).await?;
    let total_alerts = alerts.len();
    let unresolved = alerts.iter().filter(|a| !a.resolved).count();

    let mut by_severity = std::collections::HashMap::new();
    for alert in &alerts {
        *by_severity.entry(alert.severity.clone()).or_insert(0) += 1;
    }

    let recent_alerts = alerts.into_iter().take(10).collect();

    Ok(Json(DriftSummaryResponse {
        total_alerts,
        unresolved,
        by_severity,
        recent_alerts,
    }))
}

pub async fn resolve(
    State(state): State<AppState>,
    CurrentProject(project_id): CurrentProject,
    Path(id): Path<String>,
) -> VigilResult<Json<DriftAlert>> {
    let alert = state.db.resolve_drift_alert(&project_id, &id).await?;
    Ok(Json(alert))
}
