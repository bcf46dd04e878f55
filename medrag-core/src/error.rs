//! Error types for the MedRAG core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering configuration, request validation, and upstream service failures.

use std::path::PathBuf;

/// Top-level error type for the MedRAG core library.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Upstream failures keep their own message so callers can surface it verbatim.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// The external service an [`UpstreamError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Embeddings,
    VectorIndex,
    Llm,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::Embeddings => write!(f, "embeddings"),
            Service::VectorIndex => write!(f, "vector index"),
            Service::Llm => write!(f, "llm"),
        }
    }
}

/// Errors from the embedding service, vector index, or chat model.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} request failed: {message}")]
    ApiRequest { service: Service, message: String },

    #[error("{service} response parse error: {message}")]
    ResponseParse { service: Service, message: String },

    #[error("Authentication failed for {service}")]
    AuthFailed { service: Service },

    #[error("Rate limited by {service}, retry after {retry_after_secs}s")]
    RateLimited {
        service: Service,
        retry_after_secs: u64,
    },

    #[error("{service} request timed out after {timeout_secs}s")]
    Timeout { service: Service, timeout_secs: u64 },

    #[error("{service} connection failed: {message}")]
    Connection { service: Service, message: String },

    #[error("Vector index not found: {name}")]
    IndexNotFound { name: String },
}

impl UpstreamError {
    /// The service this error came from.
    pub fn service(&self) -> Service {
        match self {
            UpstreamError::ApiRequest { service, .. }
            | UpstreamError::ResponseParse { service, .. }
            | UpstreamError::AuthFailed { service }
            | UpstreamError::RateLimited { service, .. }
            | UpstreamError::Timeout { service, .. }
            | UpstreamError::Connection { service, .. } => *service,
            UpstreamError::IndexNotFound { .. } => Service::VectorIndex,
        }
    }

    /// Classify a `reqwest` transport error.
    pub fn from_transport(service: Service, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout {
                service,
                timeout_secs,
            }
        } else if err.is_connect() {
            UpstreamError::Connection {
                service,
                message: err.to_string(),
            }
        } else {
            UpstreamError::ApiRequest {
                service,
                message: err.to_string(),
            }
        }
    }

    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(service: Service, status: reqwest::StatusCode, body_text: &str) -> Self {
        match status.as_u16() {
            401 | 403 => UpstreamError::AuthFailed { service },
            429 => UpstreamError::RateLimited {
                service,
                retry_after_secs: 30,
            },
            502..=504 => UpstreamError::Connection {
                service,
                message: format!("HTTP {}: {}", status, body_text),
            },
            _ => UpstreamError::ApiRequest {
                service,
                message: format!("HTTP {}: {}", status, body_text),
            },
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from validating an inbound question.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("message is required")]
    MissingMessage,
}

/// A type alias for results using the top-level `RagError`.
pub type Result<T> = std::result::Result<T, RagError>;
