//! OpenAI-compatible chat completions client.

use crate::error::{LlmError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single-prompt completion call against the hosted model.
///
/// Implemented by [`ChatClient`] in production; tests substitute stubs to
/// script rate-limit and parse behavior.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Send one user prompt and return the raw reply text.
    async fn complete(&self, api_key: &str, prompt: &str, max_tokens: u32) -> Result<String>;
}

/// Reqwest-backed [`ChatModel`] over an OpenAI-compatible endpoint.
pub struct ChatClient {
    api_base: String,
    model: String,
    temperature: f32,
    client: Client,
}

impl ChatClient {
    /// Create a client for the given endpoint and model.
    pub fn new(
        api_base: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_base: api_base.into(),
            model: model.into(),
            temperature,
            client,
        })
    }
}

#[async_trait::async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, api_key: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || message.contains("rate_limit_exceeded") {
                return Err(LlmError::RateLimitExceeded { message });
            }
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("bad completion payload: {e}")))?;

        reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::ParseError("no choices in response".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
