//! Generation provider implementations.

pub mod chat;
pub mod ollama;

pub use chat::ChatCompletionsClient;
pub use ollama::OllamaClient;
