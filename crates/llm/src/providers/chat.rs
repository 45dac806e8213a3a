//! OpenAI-style chat completions provider.
//!
//! Covers hosted model-serving gateways and OpenAI itself: the request is a
//! `messages` array with a system and a user turn, the answer is read from
//! `choices[0].message.content`.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use crate::types::ProviderType;
use lumen_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<LlmUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Chat completions client.
pub struct ChatCompletionsClient {
    /// Full invocation URL
    endpoint: String,

    /// Bearer token
    api_key: String,

    /// Serving endpoints address the model by URL; OpenAI wants it in the body.
    send_model: bool,

    provider: ProviderType,

    client: reqwest::Client,
}

impl ChatCompletionsClient {
    /// Create an OpenAI client for a full chat completions URL.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            send_model: true,
            provider: ProviderType::OpenAI,
            client: reqwest::Client::new(),
        }
    }

    /// Create a client for a model-serving endpoint's invocation URL. The
    /// `model` field is left out of request bodies.
    pub fn serving(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            send_model: false,
            provider: ProviderType::Serving,
            ..Self::new(endpoint, api_key)
        }
    }

    /// Bound every request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> AppResult<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    fn to_chat_request(&self, request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        ChatRequest {
            model: self.send_model.then(|| request.model.clone()),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        }
    }

    fn convert_response(&self, request: &LlmRequest, response: ChatResponse) -> AppResult<LlmResponse> {
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            AppError::Upstream("Chat completion response contained no choices".to_string())
        })?;

        Ok(LlmResponse {
            content: choice.message.content,
            model: response.model.unwrap_or_else(|| request.model.clone()),
            usage: response.usage.unwrap_or_default(),
        })
    }
}

#[async_trait::async_trait]
impl LlmClient for ChatCompletionsClient {
    fn provider_name(&self) -> &str {
        self.provider.as_str()
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(endpoint = %self.endpoint, model = %request.model, "Sending chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.to_chat_request(request))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to send chat completion: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Upstream(format!(
                "Chat completion error ({}): {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse chat completion: {}", e)))?;

        self.convert_response(request, chat_response)
    }
}
