//! Language model integrations for voice-relay
//!
//! [`LanguageModel`] is the seam the dispatcher talks to; [`GeminiClient`]
//! is the production implementation.

pub mod base;
pub mod gemini;

pub use base::{GenerationParams, LanguageModel, ModelError, ModelErrorKind, ModelResult};
pub use gemini::GeminiClient;
