use chrono::{DateTime, Utc};
use rusqlite::{params, types::Value as SqlValue, OptionalExtension, Row};
use serde_json::Value;

use super::Db;
use crate::error::{VigilError, VigilResult};

use super::models::Trace;

fn row_to_trace(row: &Row) -> rusqlite::Result<Trace> {
    let metadata: Option<String> = row.get("metadata")?;
    Ok(Trace {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        name: row.get("name")?,
        status: row.get("status")?,
        external_id: row.get("external_id")?,
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub struct TracePage {
    pub items: Vec<Trace>,
    pub total: i64,
}

#[derive(Default)]
pub struct TraceFilter {
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Db {
    pub async fn upsert_trace(
        &self,
        trace_id: String,
        project_id: String,
        name: Option<String>,
        metadata: Option<Value>,
        external_id: Option<String>,
    ) -> VigilResult<Trace> {
        self.run("upsert trace", move |conn| {
            let existing = conn
                .query_row(
                    "SELECT id, project_id, name, status, external_id, metadata, start_time, end_time, created_at, updated_at
                     FROM traces WHERE id = ?1",
                    params![trace_id],
                    row_to_trace,
                )
                .optional()?;

            if let Some(mut trace) = existing {
                if let Some(name) = name.filter(|n| !n.is_empty()) {
                    trace.name = name;
                    trace.updated_at = Utc::now();
                    conn.execute(
                        "UPDATE traces SET name = ?1, updated_at = ?2 WHERE id = ?3",
                        params![trace.name, trace.updated_at, trace.id],
                    )?;
                }
                return Ok(trace);
            }

            let now = Utc::now();
            let metadata_text = metadata.as_ref().map(|m| m.to_string());
            let trace = Trace {
                id: trace_id.clone(),
                project_id,
                name: name.unwrap_or_default(),
                status: "unset".to_string(),
                external_id,
                metadata,
                start_time: None,
                end_time: None,
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO traces (id, project_id, name, status, external_id, metadata, start_time, end_time, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    trace.id,
                    trace.project_id,
                    trace.name,
                    trace.status,
                    trace.external_id,
                    metadata_text,
                    trace.start_time,
                    trace.end_time,
                    trace.created_at,
                    trace.updated_at,
                ],
            )?;
            Ok(trace)
        })
        .await
    }

    pub async fn get_trace(&self, project_id: &str, id: &str) -> VigilResult<Trace> {
        let project_id = project_id.to_string();
        let id = id.to_string();
        let lookup_id = id.clone();
        let trace = self
            .run("get trace", move |conn| {
                conn.query_row(
                    "SELECT id, project_id, name, status, external_id, metadata, start_time, end_time, created_at, updated_at
                     FROM traces WHERE id = ?1 AND project_id = ?2",
                    params![lookup_id, project_id],
                    row_to_trace,
                )
                .optional()
            })
            .await?;
        trace.ok_or_else(|| VigilError::not_found("trace", id))
    }

    /// Load a trace by id regardless of project scope — used internally by
    /// the replay engine, which already resolves project access upstream.
    pub async fn get_trace_unscoped(&self, id: &str) -> VigilResult<Trace> {
        let id = id.to_string();
        let lookup_id = id.clone();
        let trace = self
            .run("get trace", move |conn| {
                conn.query_row(
                    "SELECT id, project_id, name, status, external_id, metadata, start_time, end_time, created_at, updated_at
                     FROM traces WHERE id = ?1",
                    params![lookup_id],
                    row_to_trace,
                )
                .optional()
            })
            .await?;
        trace.ok_or_else(|| VigilError::not_found("trace", id))
    }

    pub async fn list_traces(
        &self,
        project_id: &str,
        filter: TraceFilter,
        offset: i64,
        limit: i64,
    ) -> VigilResult<TracePage> {
        let project_id = project_id.to_string();
        self.run("list traces", move |conn| {
            let mut clauses = vec!["project_id = ?1".to_string()];
            let mut sql_params: Vec<SqlValue> = vec![SqlValue::from(project_id.clone())];

            if let Some(status) = &filter.status {
                sql_params.push(SqlValue::from(status.clone()));
                clauses.push(format!("status = ?{}", sql_params.len()));
            }
            if let Some(start) = &filter.start_date {
                sql_params.push(SqlValue::from(start.to_rfc3339()));
                clauses.push(format!("created_at >= ?{}", sql_params.len()));
            }
            if let Some(end) = &filter.end_date {
                sql_params.push(SqlValue::from(end.to_rfc3339()));
                clauses.push(format!("created_at <= ?{}", sql_params.len()));
            }

            let where_clause = clauses.join(" AND ");
            let count_sql = format!("SELECT COUNT(*) FROM traces WHERE {where_clause}");
            let total: i64 = conn.query_row(&count_sql, rusqlite::params_from_iter(sql_params.iter()), |r| r.get(0))?;

            let page_sql = format!(
                "SELECT id, project_id, name, status, external_id, metadata, start_time, end_time, created_at, updated_at
                 FROM traces WHERE {where_clause} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
                sql_params.len() + 1,
                sql_params.len() + 2,
            );
            sql_params.push(SqlValue::from(limit));
            sql_params.push(SqlValue::from(offset));
            let mut stmt = conn.prepare(&page_sql)?;
            let items = stmt
                .query_map(rusqlite::params_from_iter(sql_params.iter()), row_to_trace)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(TracePage { items, total })
        })
        .await
    }

    pub async fn patch_trace(
        &self,
        project_id: &str,
        id: &str,
        status: Option<String>,
        metadata_merge: Option<Value>,
        end_time: Option<DateTime<Utc>>,
    ) -> VigilResult<Trace> {
        let mut trace = self.get_trace(project_id, id).await?;
        if let Some(status) = status {
            trace.status = status;
        }
        if let Some(Value::Object(incoming)) = metadata_merge {
            let mut merged = trace
                .metadata
                .clone()
                .and_then(|v| v.as_object().cloned())
                .unwrap_or_default();
            for (k, v) in incoming {
                merged.insert(k, v);
            }
            trace.metadata = Some(Value::Object(merged));
        }
        if let Some(end_time) = end_time {
            trace.end_time = Some(end_time);
        }
        trace.updated_at = Utc::now();

        let t = trace.clone();
        self.run("patch trace", move |conn| {
            let metadata_text = t.metadata.as_ref().map(|m| m.to_string());
            conn.execute(
                "UPDATE traces SET status = ?1, metadata = ?2, end_time = ?3, updated_at = ?4 WHERE id = ?5",
                params![t.status, metadata_text, t.end_time, t.updated_at, t.id],
            )?;
            Ok(())
        })
        .await?;
        Ok(trace)
    }
}
