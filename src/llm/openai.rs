use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{ChatModel, ChatReply, ChatRequest, ToolCall};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Replaces every per-request temperature (some models accept only one value).
    pub temperature_override: Option<f64>,
    pub timeout_s: f64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature_override: None,
            timeout_s: 60.0,
        }
    }
}

/// Client for any OpenAI-compatible Chat Completions endpoint.
pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
    model: String,
    temperature_override: Option<f64>,
}

impl OpenAiChat {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(ref api_key) = config.api_key {
            headers.insert(
                HeaderName::from_static("authorization"),
                HeaderValue::from_str(&format!("Bearer {api_key}"))
                    .context("llm: API key is not a valid header value")?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.timeout_s))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            headers,
            model: config.model,
            temperature_override: config.temperature_override,
        })
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(self.model.clone()));

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                let mut msg = json!({ "role": m.role, "content": m.content });
                if !m.tool_calls.is_empty() {
                    msg["tool_calls"] = Value::Array(
                        m.tool_calls
                            .iter()
                            .map(|call| {
                                json!({
                                    "id": call.id,
                                    "type": "function",
                                    "function": {
                                        "name": call.name,
                                        "arguments": call.arguments.to_string(),
                                    }
                                })
                            })
                            .collect(),
                    );
                }
                if let Some(ref id) = m.tool_call_id {
                    msg["tool_call_id"] = Value::String(id.clone());
                }
                msg
            })
            .collect();
        body.insert("messages".to_string(), Value::Array(messages));

        if let Some(temperature) = self.temperature_override.or(request.temperature) {
            body.insert("temperature".to_string(), Value::from(temperature));
        }

        if !request.tools.is_empty() {
            let tools = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body.insert("tools".to_string(), Value::Array(tools));
            body.insert("tool_choice".to_string(), Value::String("auto".to_string()));
        }

        Value::Object(body)
    }
}

fn extract_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            if !s.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(s);
            }
        }
        Value::Array(items) => {
            for item in items {
                extract_text(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(text) = map.get("text").or_else(|| map.get("content")) {
                extract_text(text, out);
            }
        }
        _ => {}
    }
}

fn first_message(data: &Value) -> Option<&Value> {
    data.get("choices")?.as_array()?.first()?.get("message")
}

pub(crate) fn extract_chat_reply(data: &Value) -> Option<String> {
    let mut out = String::new();
    if let Some(content) = first_message(data).and_then(|m| m.get("content")) {
        extract_text(content, &mut out);
    }
    if out.is_empty() { None } else { Some(out) }
}

pub(crate) fn extract_chat_tool_calls(data: &Value) -> Vec<ToolCall> {
    let Some(calls) = first_message(data)
        .and_then(|m| m.get("tool_calls"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    calls
        .iter()
        .enumerate()
        .filter_map(|(i, call)| {
            let function = call.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            // Arguments arrive as a JSON-encoded string.
            let arguments = match function.get("arguments") {
                Some(Value::String(s)) if s.trim().is_empty() => json!({}),
                Some(Value::String(s)) => {
                    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
                }
                Some(other) => other.clone(),
                None => json!({}),
            };
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{}", i));
            Some(ToolCall { id, name, arguments })
        })
        .collect()
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let body = self.build_body(&request);
        debug!(model = %self.model, messages = request.messages.len(), tools = request.tools.len(), "llm request");

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("llm: request failed: {}", e))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| anyhow::anyhow!("llm: failed to read response body: {}", e))?;

        if !status.is_success() {
            anyhow::bail!(
                "llm: request to {} returned {}: {}",
                self.endpoint,
                status,
                response_text
            );
        }

        let parsed: Value = serde_json::from_str(&response_text)
            .with_context(|| format!("llm: response from {} is not JSON", self.endpoint))?;

        Ok(ChatReply {
            content: extract_chat_reply(&parsed),
            tool_calls: extract_chat_tool_calls(&parsed),
        })
    }
}
