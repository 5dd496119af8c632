//! 30-second strictly-serial tick loop, mirroring
//! `services/scheduler.py::DriftScheduler`: a process-local `last_check`
//! map (never persisted), updated before the detector runs so a slow or
//! failing pass doesn't starve subsequent ticks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{compute_psi, mean, severity_from_psi, BASELINE_MIN_SAMPLES, CURRENT_MIN_SAMPLES, DEFAULT_BASELINE_HOURS, DEFAULT_CURRENT_HOURS};
use crate::db::Db;
use crate::hub::{Hub, HubMessage};

const TICK_INTERVAL: Duration = Duration::from_secs(30);

pub struct DriftScheduler {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DriftScheduler {
    pub fn new() -> Self {
        DriftScheduler {
            handle: Mutex::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>, db: Db, hub: Arc<Hub>) {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            return;
        }
        let task = tokio::spawn(run_loop(db, hub));
        *guard = Some(task);
    }

    pub async fn stop(&self) {
        let task = self.handle.lock().await.take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Default for DriftScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_loop(db: Db, hub: Arc<Hub>) {
    let mut last_check: HashMap<String, chrono::DateTime<Utc>> = HashMap::new();
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(err) = tick(&db, &hub, &mut last_check).await {
            tracing::error!(error = %err, "drift scheduler tick failed");
        }
    }
}

async fn tick(
    db: &Db,
    hub: &Hub,
    last_check: &mut HashMap<String, chrono::DateTime<Utc>>,
) -> crate::error::VigilResult<()> {
    let settings = db.list_enabled_drift_settings().await?;
    let now = Utc::now();

    for setting in settings {
        let due = last_check
            .get(&setting.project_id)
            .map(|last| now.signed_duration_since(*last).num_seconds() >= setting.drift_check_interval_minutes * 60)
            .unwrap_or(true);
        if !due {
            continue;
        }
        last_check.insert(setting.project_id.clone(), now);

        if let Err(err) = evaluate_project(db, hub, &setting.project_id, now).await {
            tracing::error!(project_id = %setting.project_id, error = %err, "drift evaluation failed");
        }
    }
    Ok(())
}

async fn evaluate_project(
    db: &Db,
    hub: &Hub,
    project_id: &str,
    now: chrono::DateTime<Utc>,
) -> crate::error::VigilResult<()> {
    let baseline_cutoff = now - chrono::Duration::hours(DEFAULT_BASELINE_HOURS);
    let current_cutoff = now - chrono::Duration::hours(DEFAULT_CURRENT_HOURS);

    let rows = db.span_latencies_since(project_id, baseline_cutoff).await?;

    let mut by_kind: HashMap<String, Vec<(chrono::DateTime<Utc>, f64)>> = HashMap::new();
    for (kind, start, latency) in rows {
        by_kind.entry(kind).or_default().push((start, latency));
    }

    for (kind, samples) in by_kind {
        let baseline: Vec<f64> = samples.iter().map(|(_, l)| *l).collect();
        let current: Vec<f64> = samples
            .iter()
            .filter(|(start, _)| *start >= current_cutoff)
            .map(|(_, l)| *l)
            .collect();

        if baseline.len() < BASELINE_MIN_SAMPLES || current.len() < CURRENT_MIN_SAMPLES {
            continue;
        }

        let psi = compute_psi(&baseline, &current);
        if psi < 0.1 {
            continue;
        }

        let severity = severity_from_psi(psi);
        let alert = db
            .create_drift_alert(
                project_id.to_string(),
                kind.clone(),
                "latency".to_string(),
                mean(&baseline),
                mean(&current),
                psi,
                severity.as_str().to_string(),
            )
            .await?;

        db.create_notification(
            project_id.to_string(),
            "drift_alert".to_string(),
            format!("Drift detected in {kind} spans"),
            format!("PSI score {psi:.3} ({severity})", severity = severity.as_str()),
            Some(alert.id.clone()),
        )
        .await?;

        hub.broadcast(
            project_id,
            &HubMessage::DriftAlert {
                data: serde_json::json!({
                    "alert_id": alert.id,
                    "span_kind": alert.span_kind,
                    "psi_score": alert.psi_score,
                    "severity": alert.severity,
                }),
            },
        );
    }

    Ok(())
}
