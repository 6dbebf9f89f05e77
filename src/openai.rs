use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use crate::config::Config;

/// Chat completion request, serialized as-is to the OpenAI API
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Build a single system + user exchange
    pub fn new(
        model: &str,
        system: impl Into<String>,
        user: impl Into<String>,
        temperature: f64,
        max_tokens: u32,
    ) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.into(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.into(),
                },
            ],
            temperature,
            max_tokens,
        }
    }

    /// Content of the first message with the given role
    pub fn content_of(&self, role: &str) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn system_message(&self) -> &str {
        self.content_of("system")
    }

    pub fn user_message(&self) -> &str {
        self.content_of("user")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: String,
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

// Content is null for refusals
#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Generated text plus the provenance needed to audit it
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    /// Upstream response identifier (e.g. `chatcmpl-...`)
    pub id: String,
    /// Untrimmed text of the first choice
    pub content: String,
    /// Full response body
    pub raw: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("failed to reach the model API: {0}")]
    Transport(String),

    #[error("OpenAI API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode model response: {0}")]
    Decode(String),

    #[error("model response contained no choices")]
    EmptyResponse,
}

/// Anything that can answer a chat-style prompt
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Model identifier recorded in provenance metadata
    fn model(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ChatError>;
}

/// OpenAI chat completions over HTTP
pub struct OpenAiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.openai_api_url,
            &config.openai_api_key,
            &config.openai_model,
        )
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ChatError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(ChatError::Api { status, body });
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;

        parse_completion(raw)
    }
}

fn parse_completion(raw: serde_json::Value) -> Result<ChatCompletion, ChatError> {
    let parsed: ChatResponse =
        serde_json::from_value(raw.clone()).map_err(|e| ChatError::Decode(e.to_string()))?;

    let choice = parsed.choices.into_iter().next().ok_or(ChatError::EmptyResponse)?;

    Ok(ChatCompletion {
        id: parsed.id,
        content: choice.message.content.unwrap_or_default(),
        raw,
    })
}

/// Sleeps a fixed delay after every successful completion of the wrapped client
pub struct Paced<C> {
    inner: C,
    delay: Duration,
}

impl<C> Paced<C> {
    pub fn new(inner: C, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<C: ChatClient> ChatClient for Paced<C> {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ChatError> {
        let completion = self.inner.complete(request).await?;
        if !self.delay.is_zero() {
            debug!("Waiting {:?} before the next model call", self.delay);
            sleep(self.delay).await;
        }
        Ok(completion)
    }
}
