//! Model invocation: Anthropic Messages API client with one-shot fallback.
//!
//! The primary model is called once. If it fails with the "not found / not
//! deployed" class of error and a fallback model is configured, the fallback
//! is called once. Nothing else is retried.

use crate::config::LlmConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use pianta_shared::prompt::{PromptMessage, PromptRequest};
use pianta_shared::{PiantaError, EMPTY_MODEL_REPLY};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Error text fragments that mean "this model is not available here".
const UNAVAILABLE_MARKERS: &[&str] = &[
    "not_found",
    "not found",
    "not deployed",
    "does not exist",
    "unknown model",
    "model_not_available",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model API returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("model returned no text")]
    EmptyResponse,

    #[error("could not decode model response: {0}")]
    Decode(String),
}

impl ModelError {
    /// Substring match on the error text, plus HTTP 404.
    pub fn is_model_unavailable(&self) -> bool {
        if let ModelError::Http { status: 404, .. } = self {
            return true;
        }
        let text = self.to_string().to_lowercase();
        UNAVAILABLE_MARKERS.iter().any(|m| text.contains(m))
    }
}

// ============================================================================
// Model Invoker Trait
// ============================================================================

/// Minimal interface the chat service needs from a model provider.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Raw text of the model's reply.
    async fn invoke(&self, model: &str, request: &PromptRequest) -> Result<String, ModelError>;
}

/// Text plus the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub model: String,
    pub used_fallback: bool,
}

/// Primary call, then at most one fallback call.
pub async fn invoke_with_fallback(
    invoker: &dyn ModelInvoker,
    primary: &str,
    fallback: Option<&str>,
    request: &PromptRequest,
) -> Result<ModelReply, PiantaError> {
    let first = match invoker.invoke(primary, request).await {
        Ok(text) => return Ok(reply(text, primary, false)),
        Err(ModelError::EmptyResponse) => return Ok(reply(EMPTY_MODEL_REPLY.to_string(), primary, false)),
        Err(e) => e,
    };

    let fallback = fallback.filter(|f| !f.trim().is_empty() && *f != primary);
    let Some(fallback) = fallback.filter(|_| first.is_model_unavailable()) else {
        error!("[-]  model {} failed: {}", primary, first);
        return Err(PiantaError::Model(first.to_string()));
    };

    warn!("[!]  model {} unavailable ({}), trying {}", primary, first, fallback);
    match invoker.invoke(fallback, request).await {
        Ok(text) => Ok(reply(text, fallback, true)),
        Err(ModelError::EmptyResponse) => Ok(reply(EMPTY_MODEL_REPLY.to_string(), fallback, true)),
        Err(second) => {
            error!("[-]  fallback model {} failed: {}", fallback, second);
            Err(PiantaError::ModelExhausted(format!(
                "{}: {}; {}: {}",
                primary, first, fallback, second
            )))
        }
    }
}

fn reply(text: String, model: &str, used_fallback: bool) -> ModelReply {
    ModelReply {
        text,
        model: model.to_string(),
        used_fallback,
    }
}

// ============================================================================
// Anthropic Client (Production)
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [PromptMessage],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ModelInvoker for AnthropicClient {
    async fn invoke(&self, model: &str, request: &PromptRequest) -> Result<String, ModelError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model,
            max_tokens: self.max_tokens,
            system: &request.system,
            messages: &request.messages,
        };

        info!("[>]  LLM CALL [{}] ({} messages)", model, request.messages.len());
        debug!("[S]  SYSTEM PROMPT ({} chars)", request.system.len());
        let start = Instant::now();

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;
        let text = join_text_blocks(&parsed);
        info!(
            "[<]  LLM RESPONSE [{}] ({} chars, {} ms)",
            model,
            text.len(),
            start.elapsed().as_millis()
        );

        if text.is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Text blocks joined by newline, trimmed.
fn join_text_blocks(response: &MessagesResponse) -> String {
    response
        .content
        .iter()
        .filter_map(|b| b.text.as_deref())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// ============================================================================
// Scripted Model (Testing)
// ============================================================================

/// Model invoker with canned per-model outcomes.
///
/// Models without a script answer with a 404 "model not found".
#[derive(Default, Clone)]
pub struct ScriptedModel {
    outcomes: HashMap<String, Result<String, ModelError>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, model: &str, text: &str) -> Self {
        self.outcomes.insert(model.to_string(), Ok(text.to_string()));
        self
    }

    pub fn fail(mut self, model: &str, error: ModelError) -> Self {
        self.outcomes.insert(model.to_string(), Err(error));
        self
    }

    /// Models invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelInvoker for ScriptedModel {
    async fn invoke(&self, model: &str, _request: &PromptRequest) -> Result<String, ModelError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(model.to_string());
        }
        self.outcomes.get(model).cloned().unwrap_or_else(|| {
            Err(ModelError::Http {
                status: 404,
                body: format!("model not found: {}", model),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PromptRequest {
        PromptRequest {
            system: "sys".into(),
            messages: vec![],
        }
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(ModelError::Http {
            status: 404,
            body: String::new()
        }
        .is_model_unavailable());
        assert!(ModelError::Http {
            status: 400,
            body: r#"{"error":{"type":"not_found_error"}}"#.into()
        }
        .is_model_unavailable());
        assert!(ModelError::Transport("deployment not deployed in region".into()).is_model_unavailable());
        assert!(!ModelError::Http {
            status: 529,
            body: "overloaded".into()
        }
        .is_model_unavailable());
        assert!(!ModelError::EmptyResponse.is_model_unavailable());
    }

    #[test]
    fn test_join_text_blocks() {
        let parsed: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":" ciao "},{"type":"tool_use"},{"type":"text","text":"mondo\n"}]}"#,
        )
        .unwrap();
        assert_eq!(join_text_blocks(&parsed), "ciao \nmondo");
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let model = ScriptedModel::new().reply("a", "{}").reply("b", "nope");
        let out = invoke_with_fallback(&model, "a", Some("b"), &request()).await.unwrap();
        assert_eq!(out.model, "a");
        assert!(!out.used_fallback);
        assert_eq!(model.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_fallback_on_unavailable_model() {
        let model = ScriptedModel::new().reply("b", "testo");
        let out = invoke_with_fallback(&model, "a", Some("b"), &request()).await.unwrap();
        assert_eq!(out.text, "testo");
        assert!(out.used_fallback);
        assert_eq!(model.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_no_fallback_on_other_errors() {
        let model = ScriptedModel::new()
            .fail("a", ModelError::Transport("connection reset".into()))
            .reply("b", "testo");
        let err = invoke_with_fallback(&model, "a", Some("b"), &request()).await.unwrap_err();
        assert!(matches!(err, PiantaError::Model(_)));
        assert_eq!(model.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_both_failing_is_exhausted() {
        let model = ScriptedModel::new();
        let err = invoke_with_fallback(&model, "a", Some("b"), &request()).await.unwrap_err();
        assert!(matches!(err, PiantaError::ModelExhausted(_)));
        assert_eq!(err.http_status(), 502);
        assert_eq!(model.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_text_becomes_default_reply() {
        let model = ScriptedModel::new().fail("a", ModelError::EmptyResponse);
        let out = invoke_with_fallback(&model, "a", None, &request()).await.unwrap();
        assert_eq!(out.text, EMPTY_MODEL_REPLY);
    }
}
