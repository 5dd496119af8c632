//! Provider autodetection, cost estimation, and raw HTTP execution against
//! OpenAI and Anthropic, mirroring `services/llm_executor.py`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{VigilError, VigilResult};

const CHARS_PER_TOKEN: f64 = 4.0;
const MIN_INPUT_TOKENS: f64 = 100.0;
const OUTPUT_TOKEN_FRACTION: f64 = 0.5;
const EXECUTION_TIMEOUT: Duration = Duration::from_secs(120);

const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
const ANTHROPIC_DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Openai => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    /// `(input $/M tokens, output $/M tokens)`.
    fn cost_per_million(&self) -> (f64, f64) {
        match self {
            Provider::Openai => (2.50, 10.00),
            Provider::Anthropic => (3.00, 15.00),
        }
    }
}

/// Name substring match first, then `span_input.model` prefix, then
/// OpenAI-shaped `messages` array, else `None`.
pub fn detect_provider(span_input: &Value, span_name: &str) -> Option<Provider> {
    let lower_name = span_name.to_lowercase();
    if ["openai", "gpt", "chatgpt"].iter().any(|needle| lower_name.contains(needle)) {
        return Some(Provider::Openai);
    }
    if ["anthropic", "claude"].iter().any(|needle| lower_name.contains(needle)) {
        return Some(Provider::Anthropic);
    }

    if let Some(model) = span_input.get("model").and_then(Value::as_str) {
        let lower_model = model.to_lowercase();
        if ["gpt", "o1", "o3"].iter().any(|prefix| lower_model.starts_with(prefix)) {
            return Some(Provider::Openai);
        }
        if lower_model.starts_with("claude") {
            return Some(Provider::Anthropic);
        }
    }

    if is_openai_shaped_messages(span_input) {
        return Some(Provider::Openai);
    }

    None
}

fn is_openai_shaped_messages(span_input: &Value) -> bool {
    match span_input.get("messages").and_then(Value::as_array) {
        Some(messages) if !messages.is_empty() => messages.iter().all(|m| {
            m.get("role").and_then(Value::as_str).is_some() && m.get("content").is_some()
        }),
        _ => false,
    }
}

fn extract_text(span_input: &Value) -> String {
    let mut text = String::new();

    if let Some(messages) = span_input.get("messages").and_then(Value::as_array) {
        for message in messages {
            match message.get("content") {
                Some(Value::String(s)) => {
                    text.push_str(s);
                    text.push('\n');
                }
                Some(Value::Array(parts)) => {
                    for part in parts {
                        if part.get("type").and_then(Value::as_str) == Some("text") {
                            if let Some(t) = part.get("text").and_then(Value::as_str) {
                                text.push_str(t);
                                text.push('\n');
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    if let Some(prompt) = span_input.get("prompt").and_then(Value::as_str) {
        text.push_str(prompt);
        text.push('\n');
    }

    text
}

fn is_empty_input(span_input: &Value) -> bool {
    match span_input {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(arr) => arr.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

pub fn estimate_cost(span_input: &Value, provider: Provider) -> f64 {
    if is_empty_input(span_input) {
        return 0.0;
    }
    let text = extract_text(span_input);
    let input_tokens = (text.chars().count() as f64 / CHARS_PER_TOKEN).max(MIN_INPUT_TOKENS);
    let output_tokens = input_tokens * OUTPUT_TOKEN_FRACTION;

    let (input_rate, output_rate) = provider.cost_per_million();
    (input_tokens / 1_000_000.0) * input_rate + (output_tokens / 1_000_000.0) * output_rate
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub provider: String,
    pub model: String,
    pub content: String,
    pub usage: Value,
    pub raw: Value,
}

fn openai_messages(span_input: &Value) -> Value {
    if let Some(messages) = span_input.get("messages") {
        return messages.clone();
    }
    json!([{ "role": "user", "content": span_input.to_string() }])
}

/// `execute(span_input, provider, api_key, model)` — a single HTTPS POST,
/// 120 s timeout, normalised into `{provider, model, content, usage, raw}`.
pub async fn execute(
    span_input: &Value,
    provider: Provider,
    api_key: &str,
    model: Option<&str>,
) -> VigilResult<ExecutionResult> {
    let client = reqwest::Client::builder()
        .timeout(EXECUTION_TIMEOUT)
        .build()
        .map_err(|e| VigilError::ProviderFailure(format!("client build failed: {e}")))?;

    match provider {
        Provider::Openai => execute_openai(&client, span_input, api_key, model).await,
        Provider::Anthropic => execute_anthropic(&client, span_input, api_key, model).await,
    }
}

async fn execute_openai(
    client: &reqwest::Client,
    span_input: &Value,
    api_key: &str,
    model: Option<&str>,
) -> VigilResult<ExecutionResult> {
    let model = model.unwrap_or(OPENAI_DEFAULT_MODEL).to_string();
    let mut body = json!({
        "model": model,
        "messages": openai_messages(span_input),
    });
    for key in ["temperature", "max_tokens", "top_p", "stop"] {
        if let Some(v) = span_input.get(key) {
            body[key] = v.clone();
        }
    }

    let response = client
        .post("https://api.openai.com/v1/chat/completions")
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| VigilError::ProviderFailure(format!("OpenAI request failed: {e}")))?;

    let raw: Value = response
        .error_for_status()
        .map_err(|e| VigilError::ProviderFailure(format!("OpenAI returned an error: {e}")))?
        .json()
        .await
        .map_err(|e| VigilError::ProviderFailure(format!("OpenAI response was not JSON: {e}")))?;

    let content = raw["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let usage = raw.get("usage").cloned().unwrap_or(Value::Null);

    Ok(ExecutionResult {
        provider: Provider::Openai.as_str().to_string(),
        model,
        content,
        usage,
        raw,
    })
}

async fn execute_anthropic(
    client: &reqwest::Client,
    span_input: &Value,
    api_key: &str,
    model: Option<&str>,
) -> VigilResult<ExecutionResult> {
    let model = model.unwrap_or(ANTHROPIC_DEFAULT_MODEL).to_string();
    let max_tokens = span_input
        .get("max_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS as u64);

    let mut messages = Vec::new();
    let mut system = None;
    if let Some(input_messages) = span_input.get("messages").and_then(Value::as_array) {
        for message in input_messages {
            if message.get("role").and_then(Value::as_str) == Some("system") {
                system = message.get("content").and_then(Value::as_str).map(str::to_string);
            } else {
                messages.push(message.clone());
            }
        }
    } else {
        messages.push(json!({ "role": "user", "content": span_input.to_string() }));
    }

    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": messages,
    });
    if let Some(system) = system {
        body["system"] = Value::String(system);
    }

    let response = client
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&body)
        .send()
        .await
        .map_err(|e| VigilError::ProviderFailure(format!("Anthropic request failed: {e}")))?;

    let raw: Value = response
        .error_for_status()
        .map_err(|e| VigilError::ProviderFailure(format!("Anthropic returned an error: {e}")))?
        .json()
        .await
        .map_err(|e| VigilError::ProviderFailure(format!("Anthropic response was not JSON: {e}")))?;

    let content = raw["content"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    let usage = raw.get("usage").cloned().unwrap_or(Value::Null);

    Ok(ExecutionResult {
        provider: Provider::Anthropic.as_str().to_string(),
        model,
        content,
        usage,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_provider_from_name() {
        assert_eq!(detect_provider(&json!({}), "openai-call"), Some(Provider::Openai));
        assert_eq!(detect_provider(&json!({}), "Claude Step"), Some(Provider::Anthropic));
    }

    #[test]
    fn detects_provider_from_model_prefix() {
        let input = json!({"model": "gpt-4o-mini"});
        assert_eq!(detect_provider(&input, "step"), Some(Provider::Openai));
        let input = json!({"model": "claude-sonnet-4-5"});
        assert_eq!(detect_provider(&input, "step"), Some(Provider::Anthropic));
    }

    #[test]
    fn detects_provider_from_openai_shaped_messages() {
        let input = json!({"messages": [{"role": "user", "content": "hi"}]});
        assert_eq!(detect_provider(&input, "step"), Some(Provider::Openai));
    }

    #[test]
    fn returns_none_when_undetectable() {
        assert_eq!(detect_provider(&json!({"foo": "bar"}), "step"), None);
    }

    #[test]
    fn empty_messages_array_is_not_openai_shaped() {
        assert_eq!(detect_provider(&json!({"messages": []}), "step"), None);
    }

    #[test]
    fn empty_span_input_has_zero_cost() {
        assert_eq!(estimate_cost(&json!(null), Provider::Openai), 0.0);
        assert_eq!(estimate_cost(&json!({}), Provider::Openai), 0.0);
    }

    #[test]
    fn cost_estimate_uses_minimum_token_floor() {
        let input = json!({"messages": [{"role": "user", "content": "hi"}]});
        let cost = estimate_cost(&input, Provider::Openai);
        // 100 input tokens (floor) + 50 output tokens at OpenAI rates.
        let expected = (100.0 / 1_000_000.0) * 2.50 + (50.0 / 1_000_000.0) * 10.00;
        assert!((cost - expected).abs() < 1e-9);
    }

    #[test]
    fn longer_input_scales_cost() {
        let short = json!({"prompt": "hi"});
        let long = json!({"prompt": "hi ".repeat(10000)});
        assert!(estimate_cost(&long, Provider::Anthropic) > estimate_cost(&short, Provider::Anthropic));
    }
}
