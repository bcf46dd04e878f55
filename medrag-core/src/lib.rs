//! # MedRAG Core
//!
//! Core library for the MedRAG medical question-answering service.
//! Provides the retriever (embeddings + vector index), the answer generator
//! (Gemini chat model), the shared pipeline, configuration, and the HTTP
//! gateway that serves it.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod gateway;
pub mod generator;
pub mod pipeline;
pub mod providers;
pub mod retriever;
pub mod retry;
pub mod types;
pub mod vector_index;

// Re-export commonly used types at the crate root.
pub use config::{Credentials, MedragConfig, load_config};
pub use embeddings::{Embedder, HuggingFaceEmbedder};
pub use error::{ConfigError, RagError, Result, Service, UpstreamError, ValidationError};
pub use gateway::{AppState, GatewayConfig, MethodPolicy};
pub use generator::AnswerGenerator;
pub use pipeline::{Pipeline, PipelineCell};
pub use providers::{GeminiProvider, LlmProvider};
pub use retriever::Retriever;
pub use types::{
    CompletionRequest, CompletionResponse, Message, Passage, Question, Role, TokenUsage,
    assemble_context,
};
pub use vector_index::{IndexMatch, PineconeIndex, VectorIndex};
