//! Embedding collaborators: text in, fixed-size vector out.

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use async_trait::async_trait;
use tracing::debug;

use crate::config::EMBEDDING_DIM;
use crate::error::{Error, Result};

/// Text embedding contract: deterministic for a given model, no side
/// effects.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Encode a batch of texts into vectors of [`Self::dimension`] size.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;
}

/// OpenAI embedding backend (requests vectors truncated to the index
/// dimension).
pub struct OpenAiEmbedder {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    /// Create from `OPENAI_API_KEY`.
    pub fn new(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::ConfigError("OPENAI_API_KEY not set".to_string()))?;

        let config = OpenAIConfig::new().with_api_key(api_key);
        Ok(Self {
            client: OpenAIClient::with_config(config),
            model: model.into(),
            dimension: EMBEDDING_DIM,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Requesting {} embeddings from OpenAI", texts.len());

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .dimensions(self.dimension as u32)
            .build()
            .map_err(|e| Error::EmbeddingError(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| Error::EmbeddingError(e.to_string()))?;

        if response.data.len() != texts.len() {
            return Err(Error::EmbeddingError(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        Ok(response.data.into_iter().map(|e| e.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic hashing bag-of-words embedder for offline use and
/// tests. Identical texts always produce identical unit vectors.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vec = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.dimension;
            vec[idx] += 1.0;
        }
        vec
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let texts = vec!["hello world rust".to_string()];
        let a = embedder.encode(&texts).await.unwrap();
        let b = embedder.encode(&texts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[tokio::test]
    async fn hash_embedder_distinguishes_texts() {
        let embedder = HashEmbedder::new(64);
        let out = embedder
            .encode(&["hello world".to_string(), "goodbye world".to_string()])
            .await
            .unwrap();
        assert_ne!(out[0], out[1]);
    }

    #[tokio::test]
    async fn hash_embedder_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(32);
        let out = embedder.encode(&["".to_string()]).await.unwrap();
        assert!(out[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn hash_embedder_enforces_minimum_dimension() {
        assert_eq!(HashEmbedder::new(0).dimension(), 8);
        assert_eq!(HashEmbedder::default().dimension(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn encode_empty_batch_returns_empty() {
        let embedder = HashEmbedder::new(16);
        assert!(embedder.encode(&[]).await.unwrap().is_empty());
    }
}
