//! Configuration system for MedRAG.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment.
//! Configuration is read from `medrag.toml` in the working directory (or an explicit
//! path), then `MEDRAG_`-prefixed environment variables, then the legacy `PORT`,
//! `HOST` and `PINECONE_INDEX` variables.
//!
//! Each service section names the environment variable that holds its API key
//! (`api_key_env`). An inline `api_key`, set in the file or through
//! `MEDRAG_<SECTION>__API_KEY`, overrides it and is never serialized back out.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::embeddings::EmbeddingConfig;
use crate::error::ConfigError;
use crate::gateway::GatewayConfig;
use crate::retriever::DEFAULT_TOP_K;
use crate::vector_index::IndexConfig;

/// Name of the config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "medrag.toml";

/// The fixed instruction placed ahead of the retrieved context.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an Medical assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, say that you don't know. \
Use three sentences maximum and keep the answer concise.";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MedragConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub upstream: UpstreamConfig,
    pub gateway: GatewayConfig,
}

/// Configuration for the chat-completion model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name. Only "gemini" is supported.
    pub provider: String,
    /// Model identifier (e.g., "gemini-1.5-flash").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env`. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Maximum tokens to generate; the model's default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Sampling temperature; the model's default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Instruction prepended to the retrieved context.
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Retrieval parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of passages fetched per question.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Settings shared by every outbound HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Total per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Retry policy for transient failures.
    pub retry: RetryConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
            retry: RetryConfig::default(),
        }
    }
}

impl UpstreamConfig {
    /// Build a `reqwest` client with this config's timeouts.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(self.connect_timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("Failed to build HTTP client: {}", e),
            })
    }
}

/// Exponential backoff settings for upstream retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// API keys for the three upstream services, resolved once at startup.
#[derive(Clone)]
pub struct Credentials {
    pub index_api_key: String,
    pub llm_api_key: String,
    pub embedding_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("index_api_key", &"<redacted>")
            .field("llm_api_key", &"<redacted>")
            .field("embedding_api_key", &"<redacted>")
            .finish()
    }
}

/// Resolve a key from an inline value or the named environment variable.
/// Empty values count as missing.
fn resolve_key(inline: Option<&String>, env_var: &str) -> Result<String, ConfigError> {
    inline
        .cloned()
        .or_else(|| std::env::var(env_var).ok())
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ConfigError::EnvVarMissing {
            var: env_var.to_string(),
        })
}

impl MedragConfig {
    /// Resolve all three credentials, failing on the first one that is absent.
    ///
    /// Checked in order: vector index, LLM, embeddings.
    pub fn resolve_credentials(&self) -> Result<Credentials, ConfigError> {
        Ok(Credentials {
            index_api_key: resolve_key(self.index.api_key.as_ref(), &self.index.api_key_env)?,
            llm_api_key: resolve_key(self.llm.api_key.as_ref(), &self.llm.api_key_env)?,
            embedding_api_key: resolve_key(
                self.embedding.api_key.as_ref(),
                &self.embedding.api_key_env,
            )?,
        })
    }

    /// Check for values that can never work.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid {
                message: "retrieval.top_k must be at least 1".to_string(),
            });
        }
        if self.llm.provider != "gemini" {
            return Err(ConfigError::Invalid {
                message: format!("unsupported llm provider '{}'", self.llm.provider),
            });
        }
        if self.index.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "index.name must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Validate this config and return human-readable warnings.
    ///
    /// Returns an empty Vec if nothing looks suspicious. Warnings never fail startup.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(temperature) = self.llm.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            warnings.push(format!(
                "llm.temperature ({}) is outside the typical range 0.0-2.0",
                temperature
            ));
        }
        if self.retrieval.top_k > 20 {
            warnings.push(format!(
                "retrieval.top_k ({}) is large; prompts may exceed the model's context",
                self.retrieval.top_k
            ));
        }
        if self.upstream.timeout_secs == 0 {
            warnings.push("upstream.timeout_secs is 0; requests will fail immediately".into());
        }
        warnings
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Legacy variables `PORT`, `HOST`, `PINECONE_INDEX`
/// 2. Environment variables prefixed with `MEDRAG_` (`MEDRAG_LLM__MODEL`, ...)
/// 3. The explicit config file, or `medrag.toml` in the working directory
/// 4. Built-in defaults
pub fn load_config(config_file: Option<&Path>) -> Result<MedragConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(MedragConfig::default()));

    match config_file {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            let local = Path::new(DEFAULT_CONFIG_FILE);
            if local.exists() {
                figment = figment.merge(Toml::file(local));
            }
        }
    }

    figment = figment
        .merge(Env::prefixed("MEDRAG_").split("__"))
        .merge(Env::raw().only(&["PORT"]).map(|_| "gateway.port".into()))
        .merge(Env::raw().only(&["HOST"]).map(|_| "gateway.host".into()))
        .merge(
            Env::raw()
                .only(&["PINECONE_INDEX"])
                .map(|_| "index.name".into()),
        );

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MedragConfig::default();
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.llm.model, "gemini-1.5-flash");
        assert_eq!(config.llm.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(config.index.name, "medical-chatbot");
        assert_eq!(config.index.api_key_env, "PINECONE_API_KEY");
        assert_eq!(config.embedding.api_key_env, "HUGGINGFACEHUB_API_KEY");
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.llm.temperature, None);
        assert_eq!(config.llm.max_tokens, None);
        assert!(config.check().is_ok());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_system_prompt_constraints() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("three sentences maximum"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("say that you don't know"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("concise"));
    }

    #[test]
    fn test_config_toml_roundtrip_skips_inline_keys() {
        let mut config = MedragConfig::default();
        config.llm.api_key = Some("secret".into());
        let toml_str = toml::to_string(&config).unwrap();
        assert!(!toml_str.contains("secret"));
        let restored: MedragConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.llm.model, config.llm.model);
        assert_eq!(restored.retrieval.top_k, 3);
        assert!(restored.llm.api_key.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: MedragConfig = toml::from_str(
            r#"
            [retrieval]
            top_k = 5

            [gateway]
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.llm.model, "gemini-1.5-flash");
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medrag.toml");
        std::fs::write(
            &path,
            r#"
            [llm]
            model = "gemini-2.0-flash"
            temperature = 0.1

            [index]
            namespace = "guidelines"
            "#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.llm.temperature, Some(0.1));
        assert_eq!(config.llm.max_tokens, None);
        assert_eq!(config.index.namespace.as_deref(), Some("guidelines"));
        assert_eq!(config.llm.api_key_env, "GOOGLE_API_KEY");
    }

    #[test]
    fn test_load_config_reads_inline_key_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medrag.toml");
        std::fs::write(&path, "[index]\napi_key = \"pc-inline\"\n").unwrap();
        // SAFETY: test-only env var manipulation
        unsafe { std::env::set_var("MEDRAG_LLM__API_KEY", "google-inline") };
        let config = load_config(Some(&path));
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("MEDRAG_LLM__API_KEY") };

        let config = config.unwrap();
        assert_eq!(config.index.api_key.as_deref(), Some("pc-inline"));
        assert_eq!(config.llm.api_key.as_deref(), Some("google-inline"));
        assert_eq!(
            resolve_key(config.llm.api_key.as_ref(), "MEDRAG_TEST_UNSET_LLM_KEY").unwrap(),
            "google-inline"
        );
        assert!(!toml::to_string(&config).unwrap().contains("inline"));
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        match load_config(Some(&path)) {
            Err(ConfigError::FileNotFound { path: p }) => assert_eq!(p, path),
            other => panic!("Expected FileNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_load_config_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medrag.toml");
        std::fs::write(&path, "[retrieval]\ntop_k = \"three\"\n").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_resolve_credentials_inline() {
        let mut config = MedragConfig::default();
        config.index.api_key = Some("pc-key".into());
        config.llm.api_key = Some("google-key".into());
        config.embedding.api_key = Some("hf-key".into());
        let creds = config.resolve_credentials().unwrap();
        assert_eq!(creds.index_api_key, "pc-key");
        assert_eq!(creds.llm_api_key, "google-key");
        assert_eq!(creds.embedding_api_key, "hf-key");
        assert!(!format!("{:?}", creds).contains("pc-key"));
    }

    #[test]
    fn test_resolve_credentials_reads_env() {
        let mut config = MedragConfig::default();
        config.index.api_key = Some("pc-key".into());
        config.llm.api_key_env = "MEDRAG_TEST_LLM_KEY_READS".into();
        config.embedding.api_key = Some("hf-key".into());
        // SAFETY: test-only env var manipulation
        unsafe { std::env::set_var("MEDRAG_TEST_LLM_KEY_READS", "from-env") };
        let creds = config.resolve_credentials().unwrap();
        assert_eq!(creds.llm_api_key, "from-env");
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("MEDRAG_TEST_LLM_KEY_READS") };
    }

    #[test]
    fn test_resolve_credentials_missing_is_fatal() {
        let mut config = MedragConfig::default();
        config.index.api_key = Some("pc-key".into());
        config.llm.api_key = Some("google-key".into());
        config.embedding.api_key_env = "MEDRAG_TEST_MISSING_HF_KEY".into();
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("MEDRAG_TEST_MISSING_HF_KEY") };
        match config.resolve_credentials() {
            Err(ConfigError::EnvVarMissing { var }) => {
                assert_eq!(var, "MEDRAG_TEST_MISSING_HF_KEY");
            }
            other => panic!("Expected EnvVarMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_credentials_blank_counts_as_missing() {
        let mut config = MedragConfig::default();
        config.index.api_key = Some("   ".into());
        config.index.api_key_env = "MEDRAG_TEST_BLANK_INDEX_KEY".into();
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("MEDRAG_TEST_BLANK_INDEX_KEY") };
        assert!(matches!(
            config.resolve_credentials(),
            Err(ConfigError::EnvVarMissing { .. })
        ));
    }

    #[test]
    fn test_check_rejects_zero_top_k() {
        let mut config = MedragConfig::default();
        config.retrieval.top_k = 0;
        assert!(matches!(config.check(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_check_rejects_unknown_provider() {
        let mut config = MedragConfig::default();
        config.llm.provider = "openai".into();
        let err = config.check().unwrap_err();
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = MedragConfig::default();
        config.llm.temperature = Some(3.5);
        config.retrieval.top_k = 50;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("temperature"));
        assert!(warnings[1].contains("top_k"));
    }
}
