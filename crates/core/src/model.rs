//! Model trait: the abstraction over the on-device language model.
//!
//! Ember never decodes tokens itself. The model is an opaque capability:
//! "generate text given a prompt and a token budget". Backends (llama.cpp,
//! candle, RWKV runtimes) implement this trait outside the workspace.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ModelError;

/// A single generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The fully wrapped prompt, ending with the template's generation prefix
    pub prompt: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Stop sequences marking end-of-turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            stop: Vec::new(),
        }
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }
}

/// The text produced by one generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text, stop sequence excluded
    pub text: String,

    /// Tokens consumed by the model, when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens_used: None,
        }
    }
}

/// The model capability consumed by the governor and the summarizer.
///
/// Calls are awaited one at a time; implementations may block internally.
#[async_trait]
pub trait Model: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Generate a continuation of `request.prompt`.
    async fn generate(&self, request: GenerationRequest) -> std::result::Result<Generation, ModelError>;
}
