//! Generation service integration for Lumen.
//!
//! Provides a provider-agnostic abstraction for single-shot, non-streaming
//! text generation.
//!
//! # Providers
//! - **Serving**: hosted chat-completions endpoints addressed by URL
//! - **OpenAI**: chat completions with the model in the request body
//! - **Ollama**: local LLM runtime (default)
//!
//! # Example
//! ```no_run
//! use lumen_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("What is edge detection?", "llama3.2")
//!     .with_max_tokens(800)
//!     .with_temperature(0.1);
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{ChatCompletionsClient, OllamaClient};
pub use types::ProviderType;
