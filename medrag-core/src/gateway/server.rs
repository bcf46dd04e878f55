//! HTTP gateway server built on axum.

use super::{GatewayConfig, MethodPolicy};
use crate::error::ValidationError;
use crate::pipeline::PipelineCell;
use crate::types::Question;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State, rejection::BytesRejection},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{error, info};

/// Generic label used when an error carries no message of its own.
const INTERNAL_ERROR: &str = "internal_error";
const METHOD_NOT_ALLOWED: &str = "method_not_allowed";

/// Shared state for the gateway handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<PipelineCell>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(pipeline: Arc<PipelineCell>, config: GatewayConfig) -> Self {
        Self {
            pipeline,
            config: Arc::new(config),
        }
    }
}

/// Successful `/api/chat` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
}

/// Body of every error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    let chat = match state.config.method_policy {
        MethodPolicy::Enforce => post(chat_handler).fallback(method_not_allowed_handler),
        MethodPolicy::Lenient => post(chat_handler).fallback(static_handler),
    };

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/chat", chat)
        .fallback(static_handler)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn method_not_allowed_handler() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED)
}

/// Serve the front-end bundle for unmatched requests.
///
/// Only GET and HEAD are served: an existing file as-is, any other path as
/// `index.html`, or 404 when that is missing too. Every other method is 404.
async fn static_handler(State(state): State<AppState>, req: Request) -> Response {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return StatusCode::NOT_FOUND.into_response();
    }
    let public_dir = &state.config.public_dir;
    let files = ServeDir::new(public_dir).fallback(ServeFile::new(public_dir.join("index.html")));
    match files.oneshot(req).await {
        Ok(resp) => resp.into_response(),
        Err(never) => match never {},
    }
}

/// Extract the question from a raw request body.
///
/// The body is parsed as a JSON object whatever its `Content-Type`; an empty
/// body counts as `{}`. Anything without a non-blank string `message` is
/// rejected.
pub fn parse_question(body: &[u8]) -> Result<Question, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::MissingMessage);
    }
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| ValidationError::MissingMessage)?;
    let message = value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .ok_or(ValidationError::MissingMessage)?;
    Question::new(message)
}

/// Bodies above axum's default limit (2 MB) are rejected with 413.
async fn chat_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(rejection.status(), rejection.body_text()),
    };
    let question = match parse_question(&body) {
        Ok(question) => question,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let result = match state.pipeline.get().await {
        Ok(pipeline) => pipeline.answer(&question).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(answer) => Json(ChatResponse { answer }).into_response(),
        Err(e) => {
            error!(error = %e, "Chat request failed");
            let message = e.to_string();
            let message = if state.config.expose_errors && !message.is_empty() {
                message
            } else {
                INTERNAL_ERROR.to_string()
            };
            error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}

/// Serve the gateway on an already-bound listener until Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Bind to the configured address and serve.
pub async fn run(state: AppState) -> Result<(), std::io::Error> {
    let addr = state.config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "MedRAG gateway listening");
    serve(listener, state).await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, RagError};
    use axum::body::Body;
    use axum::http::Request;

    fn unbuilt_state(config: GatewayConfig) -> AppState {
        let cell = PipelineCell::new(|| async {
            Err::<Arc<crate::pipeline::Pipeline>, _>(RagError::from(ConfigError::EnvVarMissing {
                var: "PINECONE_API_KEY".into(),
            }))
        });
        AppState::new(Arc::new(cell), config)
    }

    #[test]
    fn test_parse_question() {
        assert_eq!(
            parse_question(br#"{"message":"  What is hypertension? "}"#)
                .unwrap()
                .as_str(),
            "  What is hypertension? "
        );
        let rejected: [&[u8]; 10] = [
            b"",
            b"   ",
            b"{}",
            br#"{"message":""}"#,
            br#"{"message":"   "}"#,
            br#"{"message":42}"#,
            br#"{"message":null}"#,
            br#""just a string""#,
            b"not json",
            b"[1,2]",
        ];
        for body in rejected {
            assert!(
                parse_question(body).is_err(),
                "expected rejection for {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(unbuilt_state(GatewayConfig::default()));
        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_build_failure_is_500_with_message() {
        let app = router(unbuilt_state(GatewayConfig::default()));
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .body(Body::from(r#"{"message":"hi"}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
        let err: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert!(err.error.contains("PINECONE_API_KEY"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_413_json() {
        let app = router(unbuilt_state(GatewayConfig::default()));
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .body(Body::from(vec![b' '; 3 * 1024 * 1024]))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
        let err: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert!(!err.error.is_empty());
    }

    #[tokio::test]
    async fn test_hidden_errors_use_generic_label() {
        let config = GatewayConfig {
            expose_errors: false,
            ..GatewayConfig::default()
        };
        let app = router(unbuilt_state(config));
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .body(Body::from(r#"{"message":"hi"}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
        let err: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.error, "internal_error");
    }
}
