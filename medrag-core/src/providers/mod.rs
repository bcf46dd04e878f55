//! LLM provider implementations.
//!
//! Provides the [`LlmProvider`] trait and its Google Gemini implementation.
//! Use [`create_provider`] to instantiate the configured provider.

pub mod gemini;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{LlmConfig, UpstreamConfig};
use crate::error::{ConfigError, UpstreamError};
use crate::types::{CompletionRequest, CompletionResponse};

pub use gemini::GeminiProvider;

/// A hosted chat-completion model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest)
    -> Result<CompletionResponse, UpstreamError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Create an LLM provider based on the configuration and a resolved API key.
pub fn create_provider(
    config: &LlmConfig,
    api_key: String,
    upstream: &UpstreamConfig,
) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(config, api_key, upstream)?)),
        other => Err(ConfigError::Invalid {
            message: format!("unsupported llm provider '{}'", other),
        }),
    }
}
