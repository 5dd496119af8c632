//! Replay engine: estimate → confirm → background execute, with crash
//! recovery and diff retrieval. This is `spec.md`'s richer state machine
//! (§4.6), not the simpler single-shot `replay_engine.py` it's grounded on —
//! the original's topological walk, mutation-merge, and copy-vs-execute
//! logic carry over; the `estimating/confirmed/running/…` states are new.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models::{ReplayRun, Span};
use crate::db::Db;
use crate::encryption::Encryptor;
use crate::error::{VigilError, VigilResult};
use crate::hub::{Hub, HubMessage};
use crate::llm::{self, Provider};

pub type Mutations = HashMap<String, Value>;

/// Resolves a provider to a plaintext API key by decrypting the project's
/// stored settings — `None` forces copy-mode for every LLM span.
pub struct KeyResolver {
    openai_key: Option<String>,
    anthropic_key: Option<String>,
}

impl KeyResolver {
    pub async fn for_project(db: &Db, encryptor: &Encryptor, project_id: &str) -> VigilResult<Self> {
        let settings = db.get_or_create_settings(project_id).await?;
        let openai_key = settings
            .openai_api_key_encrypted
            .as_deref()
            .and_then(|c| encryptor.decrypt(c).ok());
        let anthropic_key = settings
            .anthropic_api_key_encrypted
            .as_deref()
            .and_then(|c| encryptor.decrypt(c).ok());
        Ok(KeyResolver {
            openai_key,
            anthropic_key,
        })
    }

    fn resolve(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Openai => self.openai_key.as_deref(),
            Provider::Anthropic => self.anthropic_key.as_deref(),
        }
    }
}

fn merge_mutation(input: &Option<Value>, mutation: Option<&Value>) -> Value {
    let mut base = input.clone().unwrap_or(Value::Object(Default::default()));
    if let Some(Value::Object(overlay)) = mutation {
        if let Value::Object(map) = &mut base {
            for (k, v) in overlay {
                map.insert(k.clone(), v.clone());
            }
        }
    }
    base
}

/// DFS parent-first, post-order, ignoring dangling parent references so a
/// partial ingest still produces a well-defined walk order.
pub fn topological_sort(spans: &[Span]) -> Vec<Span> {
    let by_id: HashMap<&str, &Span> = spans.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut visited = HashSet::new();
    let mut ordered = Vec::with_capacity(spans.len());

    fn visit<'a>(
        span: &'a Span,
        by_id: &HashMap<&'a str, &'a Span>,
        visited: &mut HashSet<&'a str>,
        ordered: &mut Vec<Span>,
    ) {
        if !visited.insert(span.id.as_str()) {
            return;
        }
        if let Some(parent_id) = &span.parent_span_id {
            if let Some(parent) = by_id.get(parent_id.as_str()) {
                visit(parent, by_id, visited, ordered);
            }
        }
        ordered.push(span.clone());
    }

    for span in spans {
        visit(span, &by_id, &mut visited, &mut ordered);
    }
    ordered
}

pub struct EstimateResult {
    pub run: ReplayRun,
}

pub async fn estimate(
    db: &Db,
    project_id: &str,
    trace_id: &str,
    mutations: Mutations,
) -> VigilResult<EstimateResult> {
    let trace = db.get_trace(project_id, trace_id).await?;
    let spans = db.list_spans_for_trace(&trace.id).await?;

    let mut estimated_cost = 0.0;
    let mut llm_spans_count = 0i64;

    for span in &spans {
        if span.kind != "llm" {
            continue;
        }
        let effective_input = merge_mutation(&span.input, mutations.get(&span.id));
        if let Some(provider) = llm::detect_provider(&effective_input, &span.name) {
            llm_spans_count += 1;
            estimated_cost += llm::estimate_cost(&effective_input, provider);
        }
    }

    let config = json!({ "mutations": mutations });
    let run = db
        .create_replay_run(
            trace.id.clone(),
            Some(project_id.to_string()),
            None,
            config,
            estimated_cost,
            llm_spans_count,
        )
        .await?;

    Ok(EstimateResult { run })
}

pub async fn confirm(db: Db, hub: Arc<Hub>, encryptor: Encryptor, run_id: &str) -> VigilResult<ReplayRun> {
    let mut run = db.get_replay_run(run_id).await?;
    if run.status != "estimating" {
        return Err(VigilError::InvalidReplayState);
    }
    run.status = "confirmed".to_string();
    run.updated_at = Utc::now();
    db.save_replay_run(run.clone()).await?;

    tokio::spawn(run_replay(db, hub, encryptor, run.id.clone()));

    Ok(run)
}

pub async fn cancel(db: &Db, run_id: &str) -> VigilResult<ReplayRun> {
    let mut run = db.get_replay_run(run_id).await?;
    if run.status != "estimating" && run.status != "confirmed" {
        return Err(VigilError::InvalidReplayState);
    }
    run.status = "cancelled".to_string();
    run.updated_at = Utc::now();
    db.save_replay_run(run.clone()).await?;
    Ok(run)
}

pub struct DiffView {
    pub original_trace_id: String,
    pub mutations: Value,
    pub diffs: Value,
}

pub async fn diff(db: &Db, run_id: &str) -> VigilResult<DiffView> {
    let run = db.get_replay_run(run_id).await?;
    let config = run.config.unwrap_or(Value::Null);
    Ok(DiffView {
        original_trace_id: run.original_trace_id,
        mutations: config.get("mutations").cloned().unwrap_or(Value::Null),
        diffs: config.get("diffs").cloned().unwrap_or(Value::Array(vec![])),
    })
}

async fn run_replay(db: Db, hub: Arc<Hub>, encryptor: Encryptor, run_id: String) {
    if let Err(err) = run_replay_inner(&db, &hub, &encryptor, &run_id).await {
        tracing::error!(replay_id = %run_id, error = %err, "replay execution failed");
        if let Ok(mut run) = db.get_replay_run(&run_id).await {
            run.status = "failed".to_string();
            run.error_message = Some(err.to_string());
            run.updated_at = Utc::now();
            let project_id = run.project_id.clone();
            let _ = db.save_replay_run(run).await;
            if let Some(project_id) = project_id {
                db.create_notification(
                    project_id.clone(),
                    "replay_failed".to_string(),
                    "Replay failed".to_string(),
                    err.to_string(),
                    Some(run_id.clone()),
                )
                .await
                .ok();
                hub.broadcast(
                    &project_id,
                    &HubMessage::ReplayStatus {
                        data: json!({ "replay_id": run_id, "status": "failed" }),
                    },
                );
            }
        }
    }
}

async fn run_replay_inner(db: &Db, hub: &Hub, encryptor: &Encryptor, run_id: &str) -> VigilResult<()> {
    let mut run = db.get_replay_run(run_id).await?;
    let project_id = run.project_id.clone().unwrap_or_else(|| "default".to_string());

    run.status = "running".to_string();
    run.updated_at = Utc::now();
    db.save_replay_run(run.clone()).await?;
    hub.broadcast(
        &project_id,
        &HubMessage::ReplayStatus {
            data: json!({ "replay_id": run_id, "status": "running" }),
        },
    );

    let original_trace = db.get_trace_unscoped(&run.original_trace_id).await?;
    let spans = db.list_spans_for_trace(&original_trace.id).await?;
    let ordered = topological_sort(&spans);

    let mutations: Mutations = run
        .config
        .as_ref()
        .and_then(|c| c.get("mutations"))
        .and_then(|m| serde_json::from_value(m.clone()).ok())
        .unwrap_or_default();

    let resolver = KeyResolver::for_project(db, encryptor, &project_id).await?;

    let result_trace_id = Uuid::new_v4().to_string();
    db.upsert_trace(
        result_trace_id.clone(),
        project_id.clone(),
        Some(format!("Replay of {}", original_trace.name)),
        Some(json!({ "replay_of": original_trace.id, "replay_run_id": run_id })),
        None,
    )
    .await?;

    let mut diffs = Vec::new();
    let mut actual_cost = 0.0;

    for span in &ordered {
        let mutation = mutations.get(&span.id);
        let effective_input = merge_mutation(&span.input, mutation);
        let provider = if span.kind == "llm" {
            llm::detect_provider(&effective_input, &span.name)
        } else {
            None
        };

        let (new_output, was_executed, note) = if let Some(provider) = provider {
            match resolver.resolve(provider) {
                Some(api_key) => match llm::execute(&effective_input, provider, api_key, None).await {
                    Ok(result) => {
                        actual_cost += llm::estimate_cost(&effective_input, provider);
                        (json!({ "content": result.content, "usage": result.usage }), true, None)
                    }
                    Err(err) => {
                        tracing::warn!(span_id = %span.id, error = %err, "replay LLM call failed");
                        (json!({ "error": "LLM call failed" }), true, None)
                    }
                },
                None => (
                    span.output.clone().unwrap_or(Value::Null),
                    false,
                    Some("Copied (not re-executed)".to_string()),
                ),
            }
        } else {
            (
                span.output.clone().unwrap_or(Value::Null),
                false,
                Some("Copied (not re-executed)".to_string()),
            )
        };

        let new_span_id = Uuid::new_v4().to_string();
        db.insert_spans(vec![crate::db::spans::NewSpan {
            id: new_span_id,
            trace_id: result_trace_id.clone(),
            parent_span_id: span.parent_span_id.clone(),
            name: span.name.clone(),
            kind: span.kind.clone(),
            status: span.status.clone(),
            input: Some(effective_input.clone()),
            output: Some(new_output.clone()),
            metadata: span.metadata.clone(),
            start_time: span.start_time,
            end_time: span.end_time,
        }])
        .await?;

        let mut entry = json!({
            "span_id": span.id,
            "span_name": span.name,
            "original_input": span.input,
            "mutated_input": effective_input,
            "original_output": span.output,
            "new_output": new_output,
            "was_executed": was_executed,
        });
        if let Some(note) = note {
            entry["note"] = Value::String(note);
        }
        diffs.push(entry);
    }

    db.patch_trace(
        &project_id,
        &result_trace_id,
        Some("ok".to_string()),
        None,
        Some(Utc::now()),
    )
    .await?;

    run.status = "completed".to_string();
    run.result_trace_id = Some(result_trace_id);
    run.actual_cost_usd = Some(actual_cost);
    run.config = Some(json!({ "mutations": mutations, "diffs": diffs }));
    run.updated_at = Utc::now();
    db.save_replay_run(run.clone()).await?;

    db.create_notification(
        project_id.clone(),
        "replay_complete".to_string(),
        "Replay completed".to_string(),
        format!("Replay of trace {} finished", original_trace.id),
        Some(run_id.to_string()),
    )
    .await?;

    hub.broadcast(
        &project_id,
        &HubMessage::ReplayStatus {
            data: json!({ "replay_id": run_id, "status": "completed" }),
        },
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn span(id: &str, parent: Option<&str>) -> Span {
        Span {
            id: id.to_string(),
            trace_id: "t1".to_string(),
            parent_span_id: parent.map(str::to_string),
            name: id.to_string(),
            kind: "chain".to_string(),
            status: "ok".to_string(),
            input: None,
            output: None,
            metadata: None,
            events: vec![],
            start_time: None,
            end_time: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn parents_precede_children() {
        let spans = vec![span("child", Some("root")), span("root", None)];
        let ordered = topological_sort(&spans);
        let root_idx = ordered.iter().position(|s| s.id == "root").unwrap();
        let child_idx = ordered.iter().position(|s| s.id == "child").unwrap();
        assert!(root_idx < child_idx);
    }

    #[test]
    fn dangling_parent_reference_is_ignored() {
        let spans = vec![span("orphan", Some("missing-parent"))];
        let ordered = topological_sort(&spans);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].id, "orphan");
    }

    #[test]
    fn merge_mutation_overlays_only_named_fields() {
        let input = Some(json!({"model": "gpt-4o", "messages": []}));
        let mutation = json!({"model": "gpt-4o-mini"});
        let merged = merge_mutation(&input, Some(&mutation));
        assert_eq!(merged["model"], "gpt-4o-mini");
        assert_eq!(merged["messages"], json!([]));
    }
}
