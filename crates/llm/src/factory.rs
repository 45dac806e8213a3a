//! Generation provider factory.
//!
//! Builds an `LlmClient` from a provider name, an optional endpoint and an
//! optional API key. Every client is bounded by the given request timeout.

use crate::client::LlmClient;
use crate::providers::{ChatCompletionsClient, OllamaClient};
use crate::types::ProviderType;
use std::sync::Arc;
use std::time::Duration;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Create a generation client based on the provider name.
///
/// # Errors
/// Returns error if:
/// - Provider is unknown
/// - Required secrets or endpoints are missing
/// - The HTTP client cannot be built
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn LlmClient>, String> {
    let provider_type =
        ProviderType::parse(provider).ok_or_else(|| format!("Unknown provider: {}", provider))?;

    match provider_type {
        ProviderType::Ollama => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            let client = OllamaClient::with_base_url(base_url)
                .with_timeout(timeout)
                .map_err(|e| e.to_string())?;
            Ok(Arc::new(client))
        }
        ProviderType::Serving => {
            let api_key = api_key.ok_or("Serving provider requires API key")?;
            let endpoint = endpoint.ok_or("Serving provider requires an endpoint URL")?;
            let client = ChatCompletionsClient::serving(endpoint, api_key)
                .with_timeout(timeout)
                .map_err(|e| e.to_string())?;
            Ok(Arc::new(client))
        }
        ProviderType::OpenAI => {
            let api_key = api_key.ok_or("OpenAI provider requires API key")?;
            let client = ChatCompletionsClient::new(endpoint.unwrap_or(OPENAI_CHAT_URL), api_key)
                .with_timeout(timeout)
                .map_err(|e| e.to_string())?;
            Ok(Arc::new(client))
        }
    }
}
