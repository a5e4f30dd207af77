//! Base trait for language models

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use voice_relay_core::config::ModelConfig;
use voice_relay_core::session::Transcript;

/// Broad class of a model failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// Rate limit or quota exhausted
    Quota,
    /// Network trouble, timeouts and server-side failures
    Transient,
    /// Everything else: bad credentials, malformed responses, refusals
    Other,
}

impl fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelErrorKind::Quota => "quota",
            ModelErrorKind::Transient => "transient",
            ModelErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A failed model call
///
/// Displays as the bare message so it can be spoken back to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ModelError {
    pub kind: ModelErrorKind,
    pub message: String,
}

impl ModelError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::Quota, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::Transient, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::Other, message)
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            ModelError::transient(e.to_string())
        } else {
            ModelError::other(e.to_string())
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Sampling parameters sent with every request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_output_tokens: 500,
        }
    }
}

impl From<&ModelConfig> for GenerationParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// Trait for language models
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a reply to `utterance`, given the prior conversation
    async fn generate(
        &self,
        history: &Transcript,
        utterance: &str,
        params: GenerationParams,
    ) -> ModelResult<String>;

    /// Name of the underlying model, for logging
    fn model_name(&self) -> String;
}
