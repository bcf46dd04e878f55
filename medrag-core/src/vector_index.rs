//! Vector index clients.
//!
//! [`VectorIndex`] answers "top-k nearest stored documents for a query vector".
//! [`PineconeIndex`] implements it against a Pinecone serverless index: the
//! index host is resolved once through the control plane when the client is
//! connected, and every query goes straight to that data-plane host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::config::{RetryConfig, UpstreamConfig};
use crate::error::{ConfigError, RagError, Service, UpstreamError};
use crate::retry::with_retry;

const DEFAULT_CONTROL_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2025-01";

/// A single nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    /// Stored passage text, if the record carries one.
    pub text: Option<String>,
}

/// Trait for vector stores that can be searched by embedding.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` matches, most similar first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, UpstreamError>;

    /// Name of the index being searched.
    fn index_name(&self) -> &str;
}

/// Configuration for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Provider name. Only "pinecone" is supported.
    pub provider: String,
    /// Index name.
    pub name: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env`. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Data-plane host. When unset it is looked up from the control plane.
    pub host: Option<String>,
    /// Control-plane base URL.
    pub control_url: String,
    /// Namespace to query; the default namespace when unset.
    pub namespace: Option<String>,
    /// Metadata key holding the passage text.
    pub text_key: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: "pinecone".into(),
            name: "medical-chatbot".into(),
            api_key_env: "PINECONE_API_KEY".into(),
            api_key: None,
            host: None,
            control_url: DEFAULT_CONTROL_URL.into(),
            namespace: None,
            text_key: "text".into(),
        }
    }
}

/// Pinecone data-plane client bound to one index.
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    name: String,
    host: Url,
    namespace: Option<String>,
    text_key: String,
    timeout_secs: u64,
    retry: RetryConfig,
}

impl std::fmt::Debug for PineconeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeIndex")
            .field("name", &self.name)
            .field("host", &self.host.as_str())
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Accept either a bare hostname (as the control plane returns it) or a full URL.
fn normalize_host(host: &str) -> Result<Url, ConfigError> {
    let with_scheme = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    Url::parse(&with_scheme).map_err(|e| ConfigError::Invalid {
        message: format!("invalid index host '{}': {}", host, e),
    })
}

impl PineconeIndex {
    /// Connect to an existing index.
    ///
    /// Performs one control-plane request unless `config.host` is set. Fails with
    /// [`UpstreamError::IndexNotFound`] when the index does not exist.
    pub async fn connect(
        config: &IndexConfig,
        api_key: String,
        upstream: &UpstreamConfig,
    ) -> Result<Self, RagError> {
        let client = upstream.http_client()?;
        let host = match &config.host {
            Some(host) => normalize_host(host)?,
            None => {
                let described = Self::describe_host(
                    &client,
                    &config.control_url,
                    &config.name,
                    &api_key,
                    upstream.timeout_secs,
                )
                .await?;
                normalize_host(&described)?
            }
        };
        info!(index = config.name.as_str(), host = host.as_str(), "Connected to vector index");

        Ok(Self {
            client,
            api_key,
            name: config.name.clone(),
            host,
            namespace: config.namespace.clone(),
            text_key: config.text_key.clone(),
            timeout_secs: upstream.timeout_secs,
            retry: upstream.retry.clone(),
        })
    }

    async fn describe_host(
        client: &reqwest::Client,
        control_url: &str,
        name: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Result<String, UpstreamError> {
        let url = format!("{}/indexes/{}", control_url.trim_end_matches('/'), name);
        debug!(url = url.as_str(), "Describing vector index");

        let response = client
            .get(&url)
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(Service::VectorIndex, timeout_secs, e))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| UpstreamError::ResponseParse {
                service: Service::VectorIndex,
                message: format!("Failed to read response body: {}", e),
            })?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(UpstreamError::IndexNotFound {
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            return Err(UpstreamError::from_status(
                Service::VectorIndex,
                status,
                &body_text,
            ));
        }

        let body: Value =
            serde_json::from_str(&body_text).map_err(|e| UpstreamError::ResponseParse {
                service: Service::VectorIndex,
                message: format!("Invalid JSON in response: {}", e),
            })?;
        body["host"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| UpstreamError::ResponseParse {
                service: Service::VectorIndex,
                message: "Missing 'host' in index description".to_string(),
            })
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.host.as_str().trim_end_matches('/'))
    }

    fn build_query_body(&self, vector: &[f32], top_k: usize) -> Value {
        let mut body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        if let Some(ns) = &self.namespace {
            body["namespace"] = Value::String(ns.clone());
        }
        body
    }

    fn parse_matches(body: &Value, text_key: &str) -> Result<Vec<IndexMatch>, UpstreamError> {
        let matches = body["matches"]
            .as_array()
            .ok_or_else(|| UpstreamError::ResponseParse {
                service: Service::VectorIndex,
                message: "Missing 'matches' array in response".to_string(),
            })?;

        Ok(matches
            .iter()
            .map(|m| IndexMatch {
                id: m["id"].as_str().unwrap_or_default().to_string(),
                score: m["score"].as_f64().unwrap_or(0.0) as f32,
                text: m["metadata"][text_key].as_str().map(str::to_string),
            })
            .collect())
    }

    async fn query_once(&self, body: &Value) -> Result<Vec<IndexMatch>, UpstreamError> {
        let response = self
            .client
            .post(self.query_url())
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(Service::VectorIndex, self.timeout_secs, e))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| UpstreamError::ResponseParse {
                service: Service::VectorIndex,
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(UpstreamError::from_status(
                Service::VectorIndex,
                status,
                &body_text,
            ));
        }

        let json: Value =
            serde_json::from_str(&body_text).map_err(|e| UpstreamError::ResponseParse {
                service: Service::VectorIndex,
                message: format!("Invalid JSON in response: {}", e),
            })?;
        Self::parse_matches(&json, &self.text_key)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, UpstreamError> {
        let body = self.build_query_body(vector, top_k);
        debug!(index = self.name.as_str(), top_k, "Querying vector index");
        with_retry(&self.retry, || self.query_once(&body)).await
    }

    fn index_name(&self) -> &str {
        &self.name
    }
}

/// Connect to the configured vector index.
pub async fn connect_index(
    config: &IndexConfig,
    api_key: String,
    upstream: &UpstreamConfig,
) -> Result<Arc<dyn VectorIndex>, RagError> {
    match config.provider.as_str() {
        "pinecone" => Ok(Arc::new(
            PineconeIndex::connect(config, api_key, upstream).await?,
        )),
        other => Err(ConfigError::Invalid {
            message: format!("unsupported vector index provider '{}'", other),
        }
        .into()),
    }
}
