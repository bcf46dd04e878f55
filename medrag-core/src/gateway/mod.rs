//! # HTTP Gateway
//!
//! The JSON API in front of the pipeline, plus static serving for the chat
//! front-end.
//!
//! | Method | Path          | Body                  | Success                 |
//! |--------|---------------|-----------------------|-------------------------|
//! | GET    | `/api/health` |                       | `200 {"status":"ok"}`   |
//! | POST   | `/api/chat`   | `{"message": string}` | `200 {"answer": string}`|
//!
//! Errors are always `{"error": string}`. Any other path is looked up under
//! [`GatewayConfig::public_dir`], falling back to its `index.html`.

mod server;

pub use server::{AppState, ChatResponse, ErrorBody, parse_question, router, run, serve};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What `/api/chat` does with a method other than POST.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodPolicy {
    /// Reply `405 {"error":"method_not_allowed"}`.
    #[default]
    Enforce,
    /// Fall through to static file serving like any unmatched path.
    Lenient,
}

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory holding the front-end bundle.
    pub public_dir: PathBuf,
    pub method_policy: MethodPolicy,
    /// Put the underlying error message in 500 responses. When false the
    /// body is always `{"error":"internal_error"}`.
    pub expose_errors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_dir: PathBuf::from("public"),
            method_policy: MethodPolicy::Enforce,
            expose_errors: true,
        }
    }
}

impl GatewayConfig {
    /// The `host:port` string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
