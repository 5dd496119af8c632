use chrono::Utc;
use rusqlite::{params, types::Value as SqlValue, OptionalExtension, Row};
use serde_json::Value;

use super::models::{Span, SpanEvent};
use super::Db;
use crate::error::{VigilError, VigilResult};

fn row_to_span(row: &Row) -> rusqlite::Result<Span> {
    let input: Option<String> = row.get("input")?;
    let output: Option<String> = row.get("output")?;
    let metadata: Option<String> = row.get("metadata")?;
    let events: Option<String> = row.get("events")?;
    Ok(Span {
        id: row.get("id")?,
        trace_id: row.get("trace_id")?,
        parent_span_id: row.get("parent_span_id")?,
        name: row.get("name")?,
        kind: row.get("kind")?,
        status: row.get("status")?,
        input: input.and_then(|s| serde_json::from_str(&s).ok()),
        output: output.and_then(|s| serde_json::from_str(&s).ok()),
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
        events: events
            .and_then(|s| serde_json::from_str::<Vec<SpanEvent>>(&s).ok())
            .unwrap_or_default(),
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub struct SpanPage {
    pub items: Vec<Span>,
    pub total: i64,
}

#[derive(Default)]
pub struct SpanFilter {
    pub kind: Option<String>,
    pub status: Option<String>,
    pub trace_id: Option<String>,
}

/// A span as supplied by a producer in an ingest batch, pre-validation.
#[derive(Debug, Clone)]
pub struct NewSpan {
    pub id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub kind: String,
    pub status: String,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub metadata: Option<Value>,
    pub start_time: Option<chrono::DateTime<Utc>>,
    pub end_time: Option<chrono::DateTime<Utc>>,
}

impl Db {
    pub async fn insert_spans(&self, spans: Vec<NewSpan>) -> VigilResult<usize> {
        self.run("insert spans", move |conn| {
            let tx = conn.unchecked_transaction()?;
            let now = Utc::now();
            for s in &spans {
                tx.execute(
                    "INSERT INTO spans
                        (id, trace_id, parent_span_id, name, kind, status, input, output, metadata, events,
                         start_time, end_time, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        s.id,
                        s.trace_id,
                        s.parent_span_id,
                        s.name,
                        s.kind,
                        s.status,
                        s.input.as_ref().map(|v| v.to_string()),
                        s.output.as_ref().map(|v| v.to_string()),
                        s.metadata.as_ref().map(|v| v.to_string()),
                        Value::Array(vec![]).to_string(),
                        s.start_time,
                        s.end_time,
                        now,
                        now,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(spans.len())
        })
        .await
    }

    pub async fn list_spans_for_trace(&self, trace_id: &str) -> VigilResult<Vec<Span>> {
        let trace_id = trace_id.to_string();
        self.run("list spans for trace", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, trace_id, parent_span_id, name, kind, status, input, output, metadata, events,
                        start_time, end_time, created_at, updated_at
                 FROM spans WHERE trace_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![trace_id], row_to_span)?;
            rows.collect()
        })
        .await
    }

    pub async fn list_spans(
        &self,
        project_id: &str,
        filter: SpanFilter,
        offset: i64,
        limit: i64,
    ) -> VigilResult<SpanPage> {
        let project_id = project_id.to_string();
        self.run("list spans", move |conn| {
            let mut clauses = vec!["t.project_id = ?1".to_string()];
            let mut sql_params: Vec<SqlValue> = vec![SqlValue::from(project_id.clone())];

            if let Some(kind) = &filter.kind {
                sql_params.push(SqlValue::from(kind.clone()));
                clauses.push(format!("s.kind = ?{}", sql_params.len()));
            }
            if let Some(status) = &filter.status {
                sql_params.push(SqlValue::from(status.clone()));
                clauses.push(format!("s.status = ?{}", sql_params.len()));
            }
            if let Some(trace_id) = &filter.trace_id {
                sql_params.push(SqlValue::from(trace_id.clone()));
                clauses.push(format!("s.trace_id = ?{}", sql_params.len()));
            }

            let where_clause = clauses.join(" AND ");
            let count_sql =
                format!("SELECT COUNT(*) FROM spans s JOIN traces t ON t.id = s.trace_id WHERE {where_clause}");
            let total: i64 = conn.query_row(&count_sql, rusqlite::params_from_iter(sql_params.iter()), |r| r.get(0))?;

            let page_sql = format!(
                "SELECT s.id, s.trace_id, s.parent_span_id, s.name, s.kind, s.status, s.input, s.output,
                        s.metadata, s.events, s.start_time, s.end_time, s.created_at, s.updated_at
                 FROM spans s JOIN traces t ON t.id = s.trace_id
                 WHERE {where_clause} ORDER BY s.created_at DESC LIMIT ?{} OFFSET ?{}",
                sql_params.len() + 1,
                sql_params.len() + 2,
            );
            sql_params.push(SqlValue::from(limit));
            sql_params.push(SqlValue::from(offset));
            let mut stmt = conn.prepare(&page_sql)?;
            let items = stmt
                .query_map(rusqlite::params_from_iter(sql_params.iter()), row_to_span)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(SpanPage { items, total })
        })
        .await
    }

    /// Returns `(kind, start_time, latency_seconds)` for every span in the
    /// project with both timestamps set and `start_time >= since`, feeding
    /// the drift detector's per-kind baseline/current windows.
    pub async fn span_latencies_since(
        &self,
        project_id: &str,
        since: chrono::DateTime<Utc>,
    ) -> VigilResult<Vec<(String, chrono::DateTime<Utc>, f64)>> {
        let project_id = project_id.to_string();
        self.run("load span latencies", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.kind, s.start_time, s.end_time
                 FROM spans s JOIN traces t ON t.id = s.trace_id
                 WHERE t.project_id = ?1 AND s.start_time >= ?2
                       AND s.start_time IS NOT NULL AND s.end_time IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![project_id, since], |row| {
                let kind: String = row.get(0)?;
                let start: chrono::DateTime<Utc> = row.get(1)?;
                let end: chrono::DateTime<Utc> = row.get(2)?;
                Ok((kind, start, end))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (kind, start, end) = row?;
                let latency = (end - start).num_milliseconds() as f64 / 1000.0;
                if latency >= 0.0 {
                    out.push((kind, start, latency));
                }
            }
            Ok(out)
        })
        .await
    }

    pub async fn append_event(
        &self,
        trace_id: &str,
        span_id: &str,
        name: String,
        attributes: Value,
    ) -> VigilResult<Span> {
        let trace_id_s = trace_id.to_string();
        let span_id_s = span_id.to_string();
        let span = self
            .run("append span event", move |conn| {
                conn.query_row(
                    "SELECT id, trace_id, parent_span_id, name, kind, status, input, output, metadata, events,
                            start_time, end_time, created_at, updated_at
                     FROM spans WHERE trace_id = ?1 AND id = ?2",
                    params![trace_id_s, span_id_s],
                    row_to_span,
                )
                .optional()
            })
            .await?;
        let mut span = span.ok_or_else(|| VigilError::not_found("span", span_id.to_string()))?;

        span.events.push(SpanEvent {
            name,
            timestamp: Utc::now(),
            attributes,
        });
        span.updated_at = Utc::now();

        let s = span.clone();
        self.run("append span event", move |conn| {
            let events_json = serde_json::to_string(&s.events).unwrap_or_else(|_| "[]".to_string());
            conn.execute(
                "UPDATE spans SET events = ?1, updated_at = ?2 WHERE id = ?3",
                params![events_json, s.updated_at, s.id],
            )?;
            Ok(())
        })
        .await?;
        Ok(span)
    }
}
