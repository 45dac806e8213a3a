//! Error types for Lumen.
//!
//! This module defines a unified error enum covering every failure category
//! in the workspace: configuration, I/O, session lifecycle, upstream services,
//! persistence, prompts and serialization.

use thiserror::Error;

/// Unified error type for Lumen.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic: errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown session id
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Another request is already in flight for this session
    #[error("Session busy: {0}")]
    Busy(String),

    /// Retrieval or generation service failure (including timeouts)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Durable storage could not be written; buffered turns are retained
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the error is one the engine surfaces to callers of `ask`/`cleanup`.
    pub fn is_session_error(&self) -> bool {
        matches!(self, AppError::NotFound(_) | AppError::Busy(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
