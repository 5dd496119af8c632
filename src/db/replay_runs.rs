use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;
use uuid::Uuid;

use super::models::ReplayRun;
use super::Db;
use crate::error::{VigilError, VigilResult};

fn row_to_run(row: &Row) -> rusqlite::Result<ReplayRun> {
    let config: Option<String> = row.get("config")?;
    Ok(ReplayRun {
        id: row.get("id")?,
        original_trace_id: row.get("original_trace_id")?,
        project_id: row.get("project_id")?,
        status: row.get("status")?,
        created_by: row.get("created_by")?,
        config: config.and_then(|s| serde_json::from_str(&s).ok()),
        result_trace_id: row.get("result_trace_id")?,
        estimated_cost_usd: row.get("estimated_cost_usd")?,
        actual_cost_usd: row.get("actual_cost_usd")?,
        llm_spans_count: row.get("llm_spans_count")?,
        error_message: row.get("error_message")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl Db {
    pub async fn create_replay_run(
        &self,
        original_trace_id: String,
        project_id: Option<String>,
        created_by: Option<String>,
        config: Value,
        estimated_cost_usd: f64,
        llm_spans_count: i64,
    ) -> VigilResult<ReplayRun> {
        self.run("create replay run", move |conn| {
            let now = Utc::now();
            let run = ReplayRun {
                id: Uuid::new_v4().to_string(),
                original_trace_id,
                project_id,
                status: "estimating".to_string(),
                created_by,
                config: Some(config),
                result_trace_id: None,
                estimated_cost_usd: Some(estimated_cost_usd),
                actual_cost_usd: None,
                llm_spans_count,
                error_message: None,
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO replay_runs
                    (id, original_trace_id, project_id, status, created_by, config, result_trace_id,
                     estimated_cost_usd, actual_cost_usd, llm_spans_count, error_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    run.id,
                    run.original_trace_id,
                    run.project_id,
                    run.status,
                    run.created_by,
                    run.config.as_ref().map(|v| v.to_string()),
                    run.result_trace_id,
                    run.estimated_cost_usd,
                    run.actual_cost_usd,
                    run.llm_spans_count,
                    run.error_message,
                    run.created_at,
                    run.updated_at,
                ],
            )?;
            Ok(run)
        })
        .await
    }

    pub async fn get_replay_run(&self, id: &str) -> VigilResult<ReplayRun> {
        let id = id.to_string();
        let lookup_id = id.clone();
        let run = self
            .run("get replay run", move |conn| {
                conn.query_row(
                    "SELECT id, original_trace_id, project_id, status, created_by, config, result_trace_id,
                            estimated_cost_usd, actual_cost_usd, llm_spans_count, error_message, created_at, updated_at
                     FROM replay_runs WHERE id = ?1",
                    params![lookup_id],
                    row_to_run,
                )
                .optional()
            })
            .await?;
        run.ok_or_else(|| VigilError::not_found("replay_run", id))
    }

    /// Unconditionally writes the given run's mutable fields back to storage.
    /// Callers are responsible for enforcing the state-machine edges before
    /// calling this — it is a dumb persistence primitive, not a transition.
    pub async fn save_replay_run(&self, run: ReplayRun) -> VigilResult<()> {
        self.run("save replay run", move |conn| {
            conn.execute(
                "UPDATE replay_runs SET
                    status = ?1, config = ?2, result_trace_id = ?3, estimated_cost_usd = ?4,
                    actual_cost_usd = ?5, llm_spans_count = ?6, error_message = ?7, updated_at = ?8
                 WHERE id = ?9",
                params![
                    run.status,
                    run.config.as_ref().map(|v| v.to_string()),
                    run.result_trace_id,
                    run.estimated_cost_usd,
                    run.actual_cost_usd,
                    run.llm_spans_count,
                    run.error_message,
                    run.updated_at,
                    run.id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Crash recovery: mark every run left `running` or `confirmed` as
    /// `failed` in one statement, before the scheduler or any replay
    /// background task starts.
    pub async fn fail_stuck_replay_runs(&self) -> VigilResult<u64> {
        self.run("recover stuck replay runs", |conn| {
            let now = Utc::now();
            let affected = conn.execute(
                "UPDATE replay_runs SET status = 'failed', error_message = ?1, updated_at = ?2
                 WHERE status IN ('running', 'confirmed')",
                params!["Server restarted during execution", now],
            )?;
            Ok(affected as u64)
        })
        .await
    }
}
