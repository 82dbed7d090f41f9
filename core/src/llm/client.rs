use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use super::conversation::Conversation;
use crate::tools::OperationRegistry;
use crate::{GeomapError, Result};

/// Configuration for the chat client loaded from environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmClientConfig {
    pub base_url: String, // e.g., https://api.openai.com/v1
    pub model: String,
    /// Only ever read from `OPENAI_API_KEY`
    #[serde(skip)]
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub temperature: f32,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: std::env::var("OPENAI_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
            request_timeout_ms: std::env::var("LLM_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30_000),
            temperature: std::env::var("OPENAI_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(0.2),
        }
    }
}

/// Tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// What the model decided for the current conversation
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Answer(String),
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
}

/// The reasoning service. Implemented over HTTP by [`ChatCompletionsClient`]
/// and by scripted fakes in tests.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, conversation: &Conversation, tools: &[Value]) -> Result<ModelReply>;
}

/// OpenAI-compatible Chat Completions client with function tools
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: Client,
    cfg: LlmClientConfig,
}

impl ChatCompletionsClient {
    pub fn new(cfg: LlmClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| GeomapError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(LlmClientConfig::default())
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.cfg
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn complete(&self, conversation: &Conversation, tools: &[Value]) -> Result<ModelReply> {
        let url = format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        debug!(target: "llm_client", url = %url, turns = conversation.len(), tools = tools.len(), "POST chat completion");

        let mut req = self
            .http
            .post(&url)
            .header("content-type", "application/json");
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let mut body = json!({
            "model": self.cfg.model,
            "messages": conversation.to_chat_messages(),
            "temperature": self.cfg.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = json!("auto");
        }

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| GeomapError::Llm(format!("Chat Completions request failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(target: "llm_client", %status, body = %text, "Chat Completions error");
            return Err(GeomapError::Llm(format!(
                "Chat Completions error: status={} body={}",
                status, text
            )));
        }

        let val: Value = resp
            .json()
            .await
            .map_err(|e| GeomapError::Llm(format!("Failed to parse Chat JSON: {e}")))?;
        parse_chat_reply(&val)
    }
}

/// Function-tool declarations for every registered operation
pub fn build_tools_for_llm(registry: &OperationRegistry) -> Vec<Value> {
    registry
        .list()
        .iter()
        .map(|spec| {
            json!({
                "type": "function",
                "function": {
                    "name": spec.name(),
                    "description": spec.description,
                    "parameters": spec.parameters_schema(),
                }
            })
        })
        .collect()
}

/// Interpret a Chat Completions response body
pub fn parse_chat_reply(v: &Value) -> Result<ModelReply> {
    let calls = parse_tool_calls_from_chat(v);
    let text = extract_text_from_chat_completions(v);
    if !calls.is_empty() {
        return Ok(ModelReply::ToolCalls {
            content: text.filter(|t| !t.trim().is_empty()),
            calls,
        });
    }
    match text {
        Some(text) if !text.trim().is_empty() => Ok(ModelReply::Answer(text)),
        _ => Err(GeomapError::Llm(
            "Missing choices[0].message.content and tool_calls in chat completion".into(),
        )),
    }
}

/// Tool calls from `choices[0].message.tool_calls`. Arguments sent as a JSON
/// string are decoded; undecodable arguments become `{}`.
pub fn parse_tool_calls_from_chat(v: &Value) -> Vec<ToolCallRequest> {
    let Some(tc_arr) = v
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("tool_calls"))
        .and_then(|x| x.as_array())
    else {
        return Vec::new();
    };

    let mut calls = Vec::new();
    for (index, tc) in tc_arr.iter().enumerate() {
        let Some(func) = tc.get("function") else {
            continue;
        };
        let name = func
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or("")
            .to_string();
        if name.is_empty() {
            continue;
        }
        let arguments = match func.get("arguments") {
            Some(Value::String(s)) => serde_json::from_str::<Value>(s).unwrap_or(json!({})),
            Some(Value::Null) | None => json!({}),
            Some(v) => v.clone(),
        };
        let id = tc
            .get("id")
            .and_then(|x| x.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| new_call_id(index));
        calls.push(ToolCallRequest {
            id,
            name,
            arguments,
        });
    }
    calls
}

fn extract_text_from_chat_completions(v: &Value) -> Option<String> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

fn new_call_id(index: usize) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("call_{:x}_{}", now, index)
}
