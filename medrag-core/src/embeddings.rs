//! Embedding providers.
//!
//! The [`Embedder`] trait turns question text into the vector used for
//! similarity search. The production implementation calls the Hugging Face
//! Inference feature-extraction endpoint with the same sentence-transformers
//! model the index was built with.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::{RetryConfig, UpstreamConfig};
use crate::error::{ConfigError, Service, UpstreamError};
use crate::retry::with_retry;

const DEFAULT_BASE_URL: &str = "https://router.huggingface.co/hf-inference/models";

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider name. Only "huggingface" is supported.
    pub provider: String,
    /// Model repository id.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env`. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Optional base URL override.
    pub base_url: Option<String>,
    /// Expected embedding dimensions.
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "huggingface".into(),
            model: "sentence-transformers/all-MiniLM-L6-v2".into(),
            api_key_env: "HUGGINGFACEHUB_API_KEY".into(),
            api_key: None,
            base_url: None,
            dimensions: 384,
        }
    }
}

/// Hugging Face Inference API embedder.
pub struct HuggingFaceEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dims: usize,
    timeout_secs: u64,
    retry: RetryConfig,
}

impl std::fmt::Debug for HuggingFaceEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceEmbedder")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("dims", &self.dims)
            .finish()
    }
}

impl HuggingFaceEmbedder {
    pub fn new(
        config: &EmbeddingConfig,
        api_key: String,
        upstream: &UpstreamConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client: upstream.http_client()?,
            api_key,
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            dims: config.dimensions,
            timeout_secs: upstream.timeout_secs,
            retry: upstream.retry.clone(),
        })
    }

    fn endpoint_url(&self) -> String {
        format!("{}/{}/pipeline/feature-extraction", self.base_url, self.model)
    }

    /// Newlines are flattened to spaces before embedding, matching how the
    /// indexed documents were embedded.
    fn prepare_input(text: &str) -> String {
        text.replace('\n', " ")
    }

    /// Parse a feature-extraction response.
    ///
    /// Sentence-transformers models return a flat vector for a single input;
    /// some deployments wrap it in a one-element batch.
    fn parse_embedding(body: &Value) -> Result<Vec<f32>, UpstreamError> {
        let parse_err = |message: &str| UpstreamError::ResponseParse {
            service: Service::Embeddings,
            message: message.to_string(),
        };

        let array = body
            .as_array()
            .ok_or_else(|| parse_err("expected a JSON array"))?;
        let row = match array.first() {
            Some(Value::Array(inner)) => inner,
            Some(_) => array,
            None => return Err(parse_err("empty embedding")),
        };

        row.iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| parse_err("non-numeric embedding component"))
            })
            .collect()
    }

    async fn embed_once(&self, input: &str) -> Result<Vec<f32>, UpstreamError> {
        let url = self.endpoint_url();
        debug!(model = self.model.as_str(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "inputs": input }))
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(Service::Embeddings, self.timeout_secs, e))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| UpstreamError::ResponseParse {
                service: Service::Embeddings,
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(UpstreamError::from_status(
                Service::Embeddings,
                status,
                &body_text,
            ));
        }

        let json: Value =
            serde_json::from_str(&body_text).map_err(|e| UpstreamError::ResponseParse {
                service: Service::Embeddings,
                message: format!("Invalid JSON in response: {}", e),
            })?;
        Self::parse_embedding(&json)
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let input = Self::prepare_input(text);
        let vector = with_retry(&self.retry, || self.embed_once(&input)).await?;
        if self.dims != 0 && vector.len() != self.dims {
            tracing::warn!(
                expected = self.dims,
                actual = vector.len(),
                "Embedding dimensions differ from configuration"
            );
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "huggingface"
    }
}

/// Create an embedder from configuration.
pub fn create_embedder(
    config: &EmbeddingConfig,
    api_key: String,
    upstream: &UpstreamConfig,
) -> Result<Arc<dyn Embedder>, ConfigError> {
    match config.provider.as_str() {
        "huggingface" => Ok(Arc::new(HuggingFaceEmbedder::new(config, api_key, upstream)?)),
        other => Err(ConfigError::Invalid {
            message: format!("unsupported embedding provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_embedder(base_url: Option<&str>) -> HuggingFaceEmbedder {
        let config = EmbeddingConfig {
            base_url: base_url.map(String::from),
            ..EmbeddingConfig::default()
        };
        HuggingFaceEmbedder::new(&config, "hf-test".into(), &UpstreamConfig::default()).unwrap()
    }

    #[test]
    fn test_embedding_config_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.provider, "huggingface");
        assert_eq!(config.model, "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(config.dimensions, 384);
    }

    #[test]
    fn test_endpoint_url() {
        let embedder = make_embedder(None);
        assert_eq!(
            embedder.endpoint_url(),
            "https://router.huggingface.co/hf-inference/models/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction"
        );

        let embedder = make_embedder(Some("http://localhost:9000/models/"));
        assert_eq!(
            embedder.endpoint_url(),
            "http://localhost:9000/models/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction"
        );
    }

    #[test]
    fn test_prepare_input_flattens_newlines() {
        assert_eq!(
            HuggingFaceEmbedder::prepare_input("What is\nhypertension?"),
            "What is hypertension?"
        );
    }

    #[test]
    fn test_parse_flat_embedding() {
        let body = serde_json::json!([0.1, -0.2, 0.3]);
        let v = HuggingFaceEmbedder::parse_embedding(&body).unwrap();
        assert_eq!(v.len(), 3);
        assert!((v[1] + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_parse_batched_embedding() {
        let body = serde_json::json!([[0.5, 0.25]]);
        let v = HuggingFaceEmbedder::parse_embedding(&body).unwrap();
        assert_eq!(v, vec![0.5, 0.25]);
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for body in [
            serde_json::json!({"error": "loading"}),
            serde_json::json!([]),
            serde_json::json!(["a", "b"]),
        ] {
            assert!(matches!(
                HuggingFaceEmbedder::parse_embedding(&body),
                Err(UpstreamError::ResponseParse {
                    service: Service::Embeddings,
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_create_embedder_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            ..EmbeddingConfig::default()
        };
        let result = create_embedder(&config, "k".into(), &UpstreamConfig::default());
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_create_embedder_huggingface() {
        let embedder = create_embedder(
            &EmbeddingConfig::default(),
            "k".into(),
            &UpstreamConfig::default(),
        )
        .unwrap();
        assert_eq!(embedder.provider_name(), "huggingface");
        assert_eq!(embedder.dimensions(), 384);
    }
}
