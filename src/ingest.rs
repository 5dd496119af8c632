//! Batch span ingestion: upserts the owning trace and inserts every span in
//! one transaction, mirroring `services/trace_service.py::ingest_spans`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::db::models::{SpanKind, TraceStatus};
use crate::db::spans::NewSpan;
use crate::db::Db;
use crate::error::{VigilError, VigilResult};

const MAX_NAME_LEN: usize = 512;
const MAX_ID_LEN: usize = 128;

#[derive(Debug, Deserialize)]
pub struct IngestSpanInput {
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub kind: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

fn default_status() -> String {
    "unset".to_string()
}

#[derive(Debug, Deserialize)]
pub struct IngestBatch {
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub trace_name: Option<String>,
    #[serde(default)]
    pub trace_metadata: Option<Value>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    pub spans: Vec<IngestSpanInput>,
}

pub struct IngestResult {
    pub trace_id: String,
    pub span_count: usize,
}

fn validate(batch: &IngestBatch) -> VigilResult<()> {
    if batch.spans.is_empty() {
        return Err(VigilError::Validation("spans must be non-empty".to_string()));
    }
    for span in &batch.spans {
        if SpanKind::parse(&span.kind).is_none() {
            return Err(VigilError::Validation(format!("invalid span kind: {}", span.kind)));
        }
        if TraceStatus::parse(&span.status).is_none() {
            return Err(VigilError::Validation(format!("invalid span status: {}", span.status)));
        }
        if span.name.chars().count() > MAX_NAME_LEN {
            return Err(VigilError::Validation("span name exceeds 512 characters".to_string()));
        }
        if span.span_id.chars().count() > MAX_ID_LEN {
            return Err(VigilError::Validation("span id exceeds 128 characters".to_string()));
        }
        if let Some(parent) = &span.parent_span_id {
            if parent.chars().count() > MAX_ID_LEN {
                return Err(VigilError::Validation("parent span id exceeds 128 characters".to_string()));
            }
        }
    }
    Ok(())
}

/// Ingests one batch for `authenticated_project_id` (the caller's resolved
/// project, falling back to the batch's own `project_id` then `"default"`
/// only when creating a brand-new trace).
pub async fn ingest(db: &Db, authenticated_project_id: &str, batch: IngestBatch) -> VigilResult<IngestResult> {
    validate(&batch)?;

    let trace_id = batch
        .trace_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let owning_project = if authenticated_project_id.is_empty() {
        batch.project_id.clone().unwrap_or_else(|| "default".to_string())
    } else {
        authenticated_project_id.to_string()
    };

    let trace = db
        .upsert_trace(
            trace_id.clone(),
            owning_project,
            batch.trace_name.clone(),
            batch.trace_metadata.clone(),
            batch.external_id.clone(),
        )
        .await?;

    let new_spans: Vec<NewSpan> = batch
        .spans
        .into_iter()
        .map(|s| NewSpan {
            id: s.span_id,
            trace_id: trace.id.clone(),
            parent_span_id: s.parent_span_id,
            name: s.name,
            kind: s.kind,
            status: s.status,
            input: s.input,
            output: s.output,
            metadata: s.metadata,
            start_time: s.start_time,
            end_time: s.end_time,
        })
        .collect();

    let span_count = db.insert_spans(new_spans).await?;

    Ok(IngestResult {
        trace_id: trace.id,
        span_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_span() -> IngestSpanInput {
        IngestSpanInput {
            span_id: "s1".to_string(),
            parent_span_id: None,
            name: "x".to_string(),
            kind: "chain".to_string(),
            status: "unset".to_string(),
            input: None,
            output: None,
            metadata: None,
            start_time: None,
            end_time: None,
        }
    }

    #[test]
    fn rejects_empty_batch() {
        let batch = IngestBatch {
            trace_id: None,
            trace_name: None,
            trace_metadata: None,
            external_id: None,
            project_id: None,
            spans: vec![],
        };
        assert!(validate(&batch).is_err());
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut span = sample_span();
        span.kind = "bogus".to_string();
        let batch = IngestBatch {
            trace_id: None,
            trace_name: None,
            trace_metadata: None,
            external_id: None,
            project_id: None,
            spans: vec![span],
        };
        assert!(validate(&batch).is_err());
    }

    #[test]
    fn accepts_well_formed_batch() {
        let batch = IngestBatch {
            trace_id: None,
            trace_name: Some("t".to_string()),
            trace_metadata: None,
            external_id: None,
            project_id: None,
            spans: vec![sample_span()],
        };
        assert!(validate(&batch).is_ok());
    }
}
