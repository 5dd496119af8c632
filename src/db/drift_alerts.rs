use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::models::DriftAlert;
use super::Db;
use crate::error::{VigilError, VigilResult};

fn row_to_alert(row: &Row) -> rusqlite::Result<DriftAlert> {
    Ok(DriftAlert {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        span_kind: row.get("span_kind")?,
        metric_name: row.get("metric_name")?,
        baseline_value: row.get("baseline_value")?,
        current_value: row.get("current_value")?,
        psi_score: row.get("psi_score")?,
        severity: row.get("severity")?,
        resolved: row.get::<_, i64>("resolved")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl Db {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_drift_alert(
        &self,
        project_id: String,
        span_kind: String,
        metric_name: String,
        baseline_value: f64,
        current_value: f64,
        psi_score: f64,
        severity: String,
    ) -> VigilResult<DriftAlert> {
        self.run("create drift alert", move |conn| {
            let now = Utc::now();
            let alert = DriftAlert {
                id: Uuid::new_v4().to_string(),
                project_id,
                span_kind,
                metric_name,
                baseline_value,
                current_value,
                psi_score,
                severity,
                resolved: false,
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO drift_alerts
                    (id, project_id, span_kind, metric_name, baseline_value, current_value,
                     psi_score, severity, resolved, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    alert.id,
                    alert.project_id,
                    alert.span_kind,
                    alert.metric_name,
                    alert.baseline_value,
                    alert.current_value,
                    alert.psi_score,
                    alert.severity,
                    alert.resolved as i64,
                    alert.created_at,
                    alert.updated_at,
                ],
            )?;
            Ok(alert)
        })
        .await
    }

    pub async fn list_drift_alerts(
        &self,
        project_id: &str,
        include_resolved: bool,
    ) -> VigilResult<Vec<DriftAlert>> {
        let project_id = project_id.to_string();
        self.run("list drift alerts", move |conn| {
            let sql = if include_resolved {
                "SELECT id, project_id, span_kind, metric_name, baseline_value, current_value,
                        psi_score, severity, resolved, created_at, updated_at
                 FROM drift_alerts WHERE project_id = ?1 ORDER BY created_at DESC"
            } else {
                "SELECT id, project_id, span_kind, metric_name, baseline_value, current_value,
                        psi_score, severity, resolved, created_at, updated_at
                 FROM drift_alerts WHERE project_id = ?1 AND resolved = 0 ORDER BY created_at DESC"
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params![project_id], row_to_alert)?;
            rows.collect()
        })
        .await
    }

    pub async fn resolve_drift_alert(&self, project_id: &str, id: &str) -> VigilResult<DriftAlert> {
        let project_id_s = project_id.to_string();
        let id_s = id.to_string();
        let lookup_id = id_s.clone();
        let existing = self
            .run("resolve drift alert", move |conn| {
                conn.query_row(
                    "SELECT id, project_id, span_kind, metric_name, baseline_value, current_value,
                            psi_score, severity, resolved, created_at, updated_at
                     FROM drift_alerts WHERE id = ?1 AND project_id = ?2",
                    params![lookup_id, project_id_s],
                    row_to_alert,
                )
                .optional()
            })
            .await?;
        let mut alert = existing.ok_or_else(|| VigilError::not_found("drift_alert", id_s))?;
        alert.resolved = true;
        alert.updated_at = Utc::now();

        let a = alert.clone();
        self.run("resolve drift alert", move |conn| {
            conn.execute(
                "UPDATE drift_alerts SET resolved = 1, updated_at = ?1 WHERE id = ?2",
                params![a.updated_at, a.id],
            )?;
            Ok(())
        })
        .await?;
        Ok(alert)
    }
}
