//! Answer generation.
//!
//! Renders the answer prompt around the assembled context and makes a single
//! bounded, low-temperature, non-streaming completion call.

use lumen_core::{AppError, AppResult};
use lumen_llm::{LlmClient, LlmRequest};
use lumen_prompt::{build_prompt, resolve_prompt, BuiltPrompt, PromptDefinition, ANSWER_PROMPT_ID};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Sampling and bounding parameters for each generation call.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            max_tokens: 800,
            temperature: 0.1,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Produces answer text from a query and its context.
pub struct AnswerGenerator {
    client: Arc<dyn LlmClient>,
    prompt: PromptDefinition,
    domain_name: String,
    settings: GenerationSettings,
}

impl AnswerGenerator {
    /// Use the answer prompt, honoring a workspace override if one exists.
    pub fn new(
        client: Arc<dyn LlmClient>,
        workspace: Option<&Path>,
        domain_name: impl Into<String>,
        settings: GenerationSettings,
    ) -> AppResult<Self> {
        let prompt = resolve_prompt(workspace, ANSWER_PROMPT_ID)?;
        Ok(Self {
            client,
            prompt,
            domain_name: domain_name.into(),
            settings,
        })
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    fn render(&self, query: &str, context: &str) -> AppResult<BuiltPrompt> {
        let mut variables = HashMap::new();
        variables.insert("domain".to_string(), self.domain_name.clone());
        variables.insert("context".to_string(), context.to_string());
        variables.insert("query".to_string(), query.to_string());
        build_prompt(&self.prompt, variables)
    }

    /// Generate an answer. Timeouts and transport failures are `Upstream`.
    pub async fn generate(&self, query: &str, context: &str) -> AppResult<String> {
        let built = self.render(query, context)?;

        let mut request = LlmRequest::new(built.user, &self.settings.model)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        tracing::debug!(
            provider = self.client.provider_name(),
            prompt = %built.metadata.source_prompt_id,
            context_chars = context.chars().count(),
            "Generating answer"
        );

        let response = tokio::time::timeout(self.settings.timeout, self.client.complete(&request))
            .await
            .map_err(|_| {
                AppError::Upstream(format!(
                    "Generation timed out after {}s",
                    self.settings.timeout.as_secs_f32()
                ))
            })??;

        tracing::debug!(
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Generation usage"
        );

        Ok(response.content)
    }
}
