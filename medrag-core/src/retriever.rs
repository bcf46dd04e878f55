//! Retriever: question text in, ranked passages out.
//!
//! Composes an [`Embedder`] and a [`VectorIndex`]. One call embeds the
//! question, asks the index for the `top_k` nearest neighbours, and returns
//! their stored text in descending similarity order.

use std::sync::Arc;
use tracing::debug;

use crate::embeddings::Embedder;
use crate::error::RagError;
use crate::types::{Passage, Question};
use crate::vector_index::VectorIndex;

/// Default number of passages per question.
pub const DEFAULT_TOP_K: usize = 3;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("embedder", &self.embedder.provider_name())
            .field("index", &self.index.index_name())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl Retriever {
    /// `top_k` is clamped to at least 1.
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            top_k: top_k.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve up to `top_k` passages for `question`, best match first.
    ///
    /// Matches without stored text are skipped. Upstream failures propagate
    /// as-is; no partial result is returned.
    pub async fn retrieve(&self, question: &Question) -> Result<Vec<Passage>, RagError> {
        let vector = self.embedder.embed(question.as_str()).await?;
        let mut matches = self.index.query(&vector, self.top_k).await?;
        let returned = matches.len();

        // Stable, so equal scores keep the index's order.
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));

        let passages: Vec<Passage> = matches
            .into_iter()
            .filter_map(|m| {
                m.text.map(|text| Passage {
                    rank: 0,
                    text,
                    score: m.score,
                    id: Some(m.id).filter(|id| !id.is_empty()),
                })
            })
            .take(self.top_k)
            .enumerate()
            .map(|(i, mut p)| {
                p.rank = i + 1;
                p
            })
            .collect();

        debug!(
            index = self.index.index_name(),
            returned,
            kept = passages.len(),
            "Retrieved passages"
        );
        Ok(passages)
    }
}
