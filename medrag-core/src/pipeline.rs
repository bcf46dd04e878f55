//! The retrieval-augmented answering pipeline and its process-wide holder.
//!
//! [`Pipeline`] binds a [`Retriever`] and an [`AnswerGenerator`]; it is
//! immutable once built and shared behind an `Arc`. [`PipelineCell`] owns the
//! one instance the gateway serves from. The binary fills it eagerly at
//! startup with [`PipelineCell::ready`]; a cell created with a factory builds
//! on first use instead, and concurrent first callers wait on the same build.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::MedragConfig;
use crate::embeddings::create_embedder;
use crate::error::Result;
use crate::generator::AnswerGenerator;
use crate::providers::create_provider;
use crate::retriever::Retriever;
use crate::types::{Question, assemble_context};
use crate::vector_index::connect_index;

#[derive(Debug)]
pub struct Pipeline {
    retriever: Retriever,
    generator: AnswerGenerator,
}

impl Pipeline {
    pub fn new(retriever: Retriever, generator: AnswerGenerator) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    /// Build the production pipeline from configuration.
    ///
    /// Fails if the config is unusable, if any credential is missing, or if the
    /// vector index cannot be resolved.
    pub async fn build(config: &MedragConfig) -> Result<Self> {
        config.check()?;
        for warning in config.validate() {
            warn!("{}", warning);
        }
        let credentials = config.resolve_credentials()?;

        let index = connect_index(&config.index, credentials.index_api_key, &config.upstream).await?;
        let embedder = create_embedder(
            &config.embedding,
            credentials.embedding_api_key,
            &config.upstream,
        )?;
        let llm = create_provider(&config.llm, credentials.llm_api_key, &config.upstream)?;

        info!(
            index = config.index.name.as_str(),
            embedding_model = config.embedding.model.as_str(),
            llm_model = llm.model_name(),
            top_k = config.retrieval.top_k,
            "Pipeline ready"
        );

        Ok(Self::new(
            Retriever::new(embedder, index, config.retrieval.top_k),
            AnswerGenerator::new(llm, &config.llm),
        ))
    }

    /// Retrieve context for `question` and generate an answer from it.
    pub async fn answer(&self, question: &Question) -> Result<String> {
        let passages = self.retriever.retrieve(question).await?;
        let context = assemble_context(&passages);
        info!(passages = passages.len(), "Answering question");
        self.generator.generate(question, &context).await
    }
}

type PipelineFactory = Box<dyn Fn() -> BoxFuture<'static, Result<Arc<Pipeline>>> + Send + Sync>;

/// Holds the single shared [`Pipeline`].
///
/// A successful build is kept for the life of the cell. A failed build leaves
/// the cell empty, so the next [`get`](Self::get) tries again.
pub struct PipelineCell {
    cell: OnceCell<Arc<Pipeline>>,
    factory: Option<PipelineFactory>,
}

impl std::fmt::Debug for PipelineCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCell")
            .field("initialized", &self.cell.initialized())
            .finish()
    }
}

impl PipelineCell {
    /// A cell that builds lazily with `factory`.
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<Pipeline>>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Some(Box::new(move || factory().boxed())),
        }
    }

    /// A cell holding an already-built pipeline.
    pub fn ready(pipeline: Arc<Pipeline>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(pipeline)),
            factory: None,
        }
    }

    /// A lazy cell that runs [`Pipeline::build`] against `config`.
    pub fn from_config(config: MedragConfig) -> Self {
        let config = Arc::new(config);
        Self::new(move || {
            let config = Arc::clone(&config);
            async move { Pipeline::build(&config).await.map(Arc::new) }
        })
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }

    /// Return the pipeline, building it first if needed.
    pub async fn get(&self) -> Result<Arc<Pipeline>> {
        let pipeline = self
            .cell
            .get_or_try_init(|| async {
                match &self.factory {
                    Some(factory) => factory().await,
                    None => Err(crate::error::ConfigError::Invalid {
                        message: "pipeline cell has no factory".to_string(),
                    }
                    .into()),
                }
            })
            .await?;
        Ok(Arc::clone(pipeline))
    }
}
