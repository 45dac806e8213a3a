//! Provider identifiers.

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    /// Model-serving gateway exposing chat completions per endpoint URL
    Serving,
    OpenAI,
    Ollama,
}

impl ProviderType {
    pub const ALL: [ProviderType; 3] = [Self::Serving, Self::OpenAI, Self::Ollama];

    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "serving" => Some(Self::Serving),
            "openai" => Some(Self::OpenAI),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serving => "serving",
            Self::OpenAI => "openai",
            Self::Ollama => "ollama",
        }
    }
}
