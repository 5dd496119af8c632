//! Trace/span read-side queries, patch, and event append — mirrors
//! `api/v1/traces.py` and `api/v1/spans.py`'s handler bodies minus the HTTP
//! framing, which lives in `api::traces`/`api::spans`.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::db::models::{Span, Trace};
use crate::db::spans::SpanFilter;
use crate::db::traces::TraceFilter;
use crate::db::Db;
use crate::error::{VigilError, VigilResult};

const MAX_LIMIT: i64 = 200;

pub fn validate_pagination(limit: i64) -> VigilResult<()> {
    if limit > MAX_LIMIT || limit < 1 {
        return Err(VigilError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    Ok(())
}

pub struct TraceDetail {
    pub trace: Trace,
    pub spans: Vec<Span>,
}

pub async fn list_traces(
    db: &Db,
    project_id: &str,
    status: Option<String>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    offset: i64,
    limit: i64,
) -> VigilResult<(Vec<Trace>, i64)> {
    validate_pagination(limit)?;
    let page = db
        .list_traces(
            project_id,
            TraceFilter {
                status,
                start_date,
                end_date,
            },
            offset,
            limit,
        )
        .await?;
    Ok((page.items, page.total))
}

pub async fn get_trace_detail(db: &Db, project_id: &str, id: &str) -> VigilResult<TraceDetail> {
    let trace = db.get_trace(project_id, id).await?;
    let spans = db.list_spans_for_trace(&trace.id).await?;
    Ok(TraceDetail { trace, spans })
}

pub async fn patch_trace(
    db: &Db,
    project_id: &str,
    id: &str,
    status: Option<String>,
    metadata_merge: Option<Value>,
) -> VigilResult<Trace> {
    if let Some(status) = &status {
        if crate::db::models::TraceStatus::parse(status).is_none() {
            return Err(VigilError::Validation(format!("invalid trace status: {status}")));
        }
    }
    db.patch_trace(project_id, id, status, metadata_merge, None).await
}

pub async fn list_spans(
    db: &Db,
    project_id: &str,
    kind: Option<String>,
    status: Option<String>,
    trace_id: Option<String>,
    offset: i64,
    limit: i64,
) -> VigilResult<(Vec<Span>, i64)> {
    validate_pagination(limit)?;
    let page = db
        .list_spans(
            project_id,
            SpanFilter {
                kind,
                status,
                trace_id,
            },
            offset,
            limit,
        )
        .await?;
    Ok((page.items, page.total))
}

pub async fn append_event(
    db: &Db,
    project_id: &str,
    trace_id: &str,
    span_id: &str,
    name: String,
    attributes: Value,
) -> VigilResult<Span> {
    // Scope check: a trace must exist under the caller's project before any
    // span within it can be touched.
    db.get_trace(project_id, trace_id).await?;
    db.append_event(trace_id, span_id, name, attributes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_limit_over_200() {
        assert!(validate_pagination(201).is_err());
    }

    #[test]
    fn rejects_zero_limit() {
        assert!(validate_pagination(0).is_err());
    }

    #[test]
    fn accepts_boundary_limit() {
        assert!(validate_pagination(200).is_ok());
    }
}
