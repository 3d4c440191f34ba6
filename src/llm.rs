use crate::catalog::ToolSpec;
use crate::config::GeminiConfig;
use crate::conversation::{Part, Role, Turn};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{Value, json};
use std::ops::AddAssign;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

static POOLED_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("enclave/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(120))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub response_tokens: u64,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.response_tokens += other.response_tokens;
    }
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: Option<String>,
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// Plain text with no tool calls: the final answer.
    Narrative(String),
    /// One or more tool calls, in the order the model issued them.
    ToolCalls {
        thought: Option<String>,
        calls: Vec<ToolCallRequest>,
        parts: Vec<Part>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub turn: ModelTurn,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    /// Worth another attempt on the next iteration (network, quota, bad response).
    #[error("completion request failed: {0}")]
    Transient(String),
    /// Retrying cannot help (missing or rejected credentials).
    #[error("completion service rejected the request: {0}")]
    Fatal(String),
}

impl CompletionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transient(err.without_url().to_string())
    }
}

/// The remote model, seen from the agent loop.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, CompletionError>;
}

pub struct GeminiClient {
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CompletionError::Fatal(format!("{} is not set", crate::config::API_KEY_ENV)))?;
        let url = format!("{}/models/{}:generateContent", GEMINI_BASE_URL, self.model);
        let payload = encode_request(system_prompt, turns, tools, self.temperature);

        let response = POOLED_CLIENT
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &self.model, error_text));
        }

        let res_json: Value = response.json().await?;
        parse_reply(&res_json)
    }
}

fn classify_failure(status: reqwest::StatusCode, model: &str, body: String) -> CompletionError {
    let message = format!("Gemini API Error (Model: {}, HTTP {}): {}", model, status.as_u16(), body);
    let bad_key = body.contains("API_KEY_INVALID") || body.contains("API key not valid");
    if matches!(status.as_u16(), 401 | 403) || bad_key {
        CompletionError::Fatal(message)
    } else {
        CompletionError::Transient(message)
    }
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User | Role::Tool => "user",
        Role::Model => "model",
    }
}

fn encode_part(part: &Part) -> Value {
    match part {
        Part::Text(text) => json!({ "text": text }),
        Part::FunctionCall { id, name, args, thought_signature } => {
            let mut call = json!({ "name": name, "args": args });
            if let Some(id) = id {
                call["id"] = json!(id);
            }
            let mut encoded = json!({ "functionCall": call });
            if let Some(signature) = thought_signature {
                encoded["thoughtSignature"] = json!(signature);
            }
            encoded
        }
        Part::FunctionResponse { id, name, response } => {
            let mut body = json!({ "name": name, "response": response });
            if let Some(id) = id {
                body["id"] = json!(id);
            }
            json!({ "functionResponse": body })
        }
    }
}

pub(crate) fn encode_request(
    system_prompt: &str,
    turns: &[Turn],
    tools: &[ToolSpec],
    temperature: f32,
) -> Value {
    let contents: Vec<Value> = turns
        .iter()
        .map(|turn| {
            let parts: Vec<Value> = turn.parts.iter().map(encode_part).collect();
            json!({ "role": gemini_role(turn.role), "parts": parts })
        })
        .collect();

    let mut payload = json!({
        "systemInstruction": {
            "parts": [{ "text": system_prompt }]
        },
        "contents": contents,
        "generationConfig": {
            "temperature": temperature
        }
    });

    if !tools.is_empty() {
        let declarations: Vec<Value> = tools.iter().map(ToolSpec::declaration).collect();
        payload["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    payload
}

pub(crate) fn parse_reply(res_json: &Value) -> Result<ModelReply, CompletionError> {
    let usage = TokenUsage {
        prompt_tokens: res_json["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
        response_tokens: res_json["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0),
    };

    let mut text_acc = String::new();
    let mut calls = Vec::new();
    let mut parts = Vec::new();

    for part in res_json["candidates"][0]["content"]["parts"].as_array().into_iter().flatten() {
        let thought_signature = part["thoughtSignature"].as_str().map(str::to_string);
        if let Some(call) = part.get("functionCall") {
            let Some(name) = call["name"].as_str() else {
                continue;
            };
            let id = call["id"].as_str().map(str::to_string);
            let args = match &call["args"] {
                Value::Null => json!({}),
                args => args.clone(),
            };
            calls.push(ToolCallRequest {
                id: id.clone(),
                name: name.to_string(),
                args: args.clone(),
            });
            parts.push(Part::FunctionCall {
                id,
                name: name.to_string(),
                args,
                thought_signature,
            });
        } else if let Some(text) = part["text"].as_str() {
            // Thought summaries are not part of the answer.
            if part["thought"].as_bool() != Some(true) {
                text_acc.push_str(text);
            }
            parts.push(Part::text(text));
        }
    }

    if !calls.is_empty() {
        let thought = Some(text_acc.trim().to_string()).filter(|value| !value.is_empty());
        return Ok(ModelReply {
            turn: ModelTurn::ToolCalls { thought, calls, parts },
            usage,
        });
    }

    if !text_acc.is_empty() {
        return Ok(ModelReply {
            turn: ModelTurn::Narrative(text_acc),
            usage,
        });
    }

    // Fallback if no text or function call was found
    let reason = res_json["candidates"][0]["finishReason"].as_str().unwrap_or("UNKNOWN");
    debug!(finish_reason = reason, "model returned no usable content");
    let msg = if reason == "SAFETY" {
        "Gemini blocked the response due to SAFETY filters. Check your prompt or history context.".to_string()
    } else {
        format!("Gemini returned no content. Finish Reason: {}", reason)
    };
    Err(CompletionError::Transient(msg))
}
