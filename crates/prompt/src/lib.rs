//! Prompt system for Lumen.
//!
//! This crate provides structured prompt management with:
//! - Built-in prompt definitions for the answering engine
//! - YAML overrides under `.lumen/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use defaults::{builtin_prompt, ANSWER_PROMPT_ID};
pub use loader::{load_prompt, resolve_prompt};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
