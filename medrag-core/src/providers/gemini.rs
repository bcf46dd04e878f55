//! Google Gemini API provider implementation.
//!
//! Implements the `LlmProvider` trait for the native Gemini `generateContent`
//! endpoint.
//!
//! Key differences from OpenAI-style chat APIs:
//! - Auth via `?key=API_KEY` query parameter (not header-based)
//! - System instruction is a top-level `system_instruction` field
//! - `generationConfig` is only sent when a sampling parameter is configured

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::LlmProvider;
use crate::config::{LlmConfig, RetryConfig, UpstreamConfig};
use crate::error::{ConfigError, Service, UpstreamError};
use crate::retry::with_retry;
use crate::types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini API provider.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
    retry: RetryConfig,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    /// Create a new Gemini provider with a resolved API key.
    pub fn new(
        config: &LlmConfig,
        api_key: String,
        upstream: &UpstreamConfig,
    ) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: upstream.http_client()?,
            base_url,
            api_key,
            model: config.model.clone(),
            timeout_secs: upstream.timeout_secs,
            retry: upstream.retry.clone(),
        })
    }

    /// Build the JSON request body for the Gemini API.
    ///
    /// System messages become the top-level `system_instruction`; everything
    /// else goes into `contents`.
    fn build_request_body(request: &CompletionRequest) -> Value {
        let (system_text, non_system) = Self::extract_system_instruction(&request.messages);
        let contents: Vec<Value> = non_system
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": "user",
                    "parts": [{"text": msg.content}],
                })
            })
            .collect();

        let mut body = serde_json::json!({ "contents": contents });

        let mut generation_config = serde_json::Map::new();
        if let Some(max_tokens) = request.max_tokens {
            generation_config.insert("maxOutputTokens".into(), max_tokens.into());
        }
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".into(), temperature.into());
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        if let Some(system) = &system_text {
            body["system_instruction"] = serde_json::json!({
                "parts": [{"text": system}]
            });
        }

        body
    }

    /// Split out system messages, joining several with a blank line.
    fn extract_system_instruction(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            if msg.role == Role::System {
                system_parts.push(&msg.content);
            } else {
                non_system.push(msg);
            }
        }

        let system_text = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system_text, non_system)
    }

    /// Parse a `generateContent` response into a `CompletionResponse`.
    fn parse_response(body: &Value) -> Result<CompletionResponse, UpstreamError> {
        let parse_err = |message: String| UpstreamError::ResponseParse {
            service: Service::Llm,
            message,
        };

        let candidates = match body["candidates"].as_array() {
            Some(c) if !c.is_empty() => c,
            _ => {
                if let Some(reason) = body["promptFeedback"]["blockReason"].as_str() {
                    return Err(UpstreamError::ApiRequest {
                        service: Service::Llm,
                        message: format!("prompt blocked by Gemini: {}", reason),
                    });
                }
                return Err(parse_err("Missing or empty 'candidates' array".to_string()));
            }
        };

        let candidate = &candidates[0];
        let finish_reason = candidate["finishReason"].as_str().map(str::to_string);
        let parts = candidate["content"]["parts"].as_array();

        let text = match parts {
            Some(parts) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<String>(),
            // A candidate cut off by a safety filter carries no content at all.
            None if finish_reason.is_some() => String::new(),
            None => return Err(parse_err("Missing 'parts' in candidate content".to_string())),
        };

        let usage_metadata = &body["usageMetadata"];
        let usage = TokenUsage {
            input_tokens: usage_metadata["promptTokenCount"].as_u64().unwrap_or(0) as usize,
            output_tokens: usage_metadata["candidatesTokenCount"].as_u64().unwrap_or(0) as usize,
        };

        let model = body["modelVersion"]
            .as_str()
            .unwrap_or("gemini")
            .to_string();

        Ok(CompletionResponse {
            text,
            usage,
            model,
            finish_reason,
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    async fn complete_once(&self, body: &Value) -> Result<CompletionResponse, UpstreamError> {
        let response = self
            .client
            .post(self.endpoint_url())
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                // reqwest errors embed the URL, which carries the key.
                UpstreamError::from_transport(Service::Llm, self.timeout_secs, e.without_url())
            })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| UpstreamError::ResponseParse {
                service: Service::Llm,
                message: format!("Failed to read response body: {}", e.without_url()),
            })?;

        if !status.is_success() {
            return Err(UpstreamError::from_status(Service::Llm, status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| UpstreamError::ResponseParse {
                service: Service::Llm,
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, UpstreamError> {
        let body = Self::build_request_body(&request);

        debug!(model = self.model.as_str(), "Sending Gemini completion request");
        let response = with_retry(&self.retry, || self.complete_once(&body)).await?;
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
            "Gemini completion finished"
        );
        Ok(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
