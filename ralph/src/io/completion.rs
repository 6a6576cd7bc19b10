//! Completion backend boundary.
//!
//! The [`CompletionClient`] trait decouples the loop from the actual backend
//! (an OpenAI-compatible `/chat/completions` endpoint). Tests use scripted
//! clients that return predetermined text without network access.

use std::error::Error as StdError;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::io::config::BackendConfig;

/// Conversation role for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// One completion request: ordered turns plus generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub turns: Vec<ChatTurn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// A system turn followed by a user turn, the shape every iteration sends.
    pub fn system_user(backend: &BackendConfig, system: String, user: String) -> Self {
        Self {
            model: backend.model.clone(),
            turns: vec![
                ChatTurn {
                    role: Role::System,
                    content: system,
                },
                ChatTurn {
                    role: Role::User,
                    content: user,
                },
            ],
            temperature: backend.temperature,
            max_tokens: backend.max_tokens,
        }
    }
}

/// Stateless text-completion backend.
pub trait CompletionClient {
    /// Send the request and return the completion text. No internal retry.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Blocking client for OpenAI-compatible chat completion APIs.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatClient {
    pub fn new(cfg: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .context("build http client")?;
        Ok(Self {
            endpoint: chat_completions_url(&cfg.base_url),
            api_key: cfg.resolve_api_key(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CompletionClient for OpenAiCompatClient {
    #[instrument(skip_all, fields(model = %request.model, endpoint = %self.endpoint))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut http = self.client.post(&self.endpoint).json(&build_payload(request));
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().map_err(|err| format_transport_error(&err))?;
        let status = response.status();
        let body = response.text().context("read completion response body")?;
        if !status.is_success() {
            return Err(format_api_error(status, &body));
        }

        let text = parse_completion_body(&body)?;
        debug!(chars = text.chars().count(), "completion received");
        Ok(text)
    }
}

/// `{base_url}/chat/completions`, tolerant of a trailing slash.
pub fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim().trim_end_matches('/'))
}

/// JSON body for a non-streaming chat completion.
pub fn build_payload(request: &CompletionRequest) -> Value {
    json!({
        "model": request.model,
        "messages": request.turns,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "stream": false,
    })
}

/// Extract `choices[0].message.content` from a response body.
pub fn parse_completion_body(body: &str) -> Result<String> {
    let value: Value =
        serde_json::from_str(body).context("malformed completion response: invalid json")?;
    let choice = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| anyhow!("malformed completion response: missing choices[0]"))?;
    let content = choice
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(anyhow!(
            "malformed completion response: missing choices[0].message.content"
        ));
    }
    Ok(content.to_string())
}

fn format_api_error(status: StatusCode, body: &str) -> anyhow::Error {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(ToString::to_string))
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status {
        StatusCode::UNAUTHORIZED => anyhow!(
            "completion backend rejected the API key (HTTP 401); set backend.api_key or the backend.api_key_env variable"
        ),
        StatusCode::TOO_MANY_REQUESTS => {
            anyhow!("completion backend is rate limiting (HTTP 429): {detail}")
        }
        status if status.is_server_error() => anyhow!(
            "completion backend error (HTTP {}): {detail}",
            status.as_u16()
        ),
        _ => anyhow!(
            "completion request failed (HTTP {}): {detail}",
            status.as_u16()
        ),
    }
}

fn format_transport_error(err: &reqwest::Error) -> anyhow::Error {
    let inner = err.source().map(|e| e.to_string()).unwrap_or_default();
    if err.is_timeout() {
        anyhow!("completion request timed out (raise backend.request_timeout_secs)")
    } else if err.is_connect() {
        anyhow!("could not connect to the completion backend: {inner}")
    } else {
        anyhow!("completion request failed: {err}")
    }
}
