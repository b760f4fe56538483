//! Second-stage relevance scoring over retrieved candidates.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::index::vector::cosine_similarity;

use super::Embedder;

/// Cross-encoder contract: higher score means more relevant.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score(&self, query: &str, doc: &str) -> Result<f32>;
}

/// Bi-encoder stand-in for a cross-encoder: scores a pair by cosine
/// similarity of the two embeddings. Useful offline; a real deployment
/// plugs a cross-encoder behind the same trait.
pub struct EmbeddingReranker {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingReranker {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Reranker for EmbeddingReranker {
    async fn score(&self, query: &str, doc: &str) -> Result<f32> {
        let mut pair = self
            .embedder
            .encode(&[query.to_string(), doc.to_string()])
            .await
            .map_err(|e| Error::RerankError(e.to_string()))?;
        if pair.len() != 2 {
            return Err(Error::RerankError(format!(
                "expected 2 embeddings, got {}",
                pair.len()
            )));
        }
        let doc_vec = pair.pop().unwrap_or_default();
        let query_vec = pair.pop().unwrap_or_default();
        Ok(cosine_similarity(&query_vec, &doc_vec))
    }
}
