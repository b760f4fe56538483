//! External model collaborators behind narrow trait contracts.
//!
//! The core never trains or owns a model: embeddings, generation,
//! reranking and tokenization are consumed through these seams. OpenAI
//! adapters cover the online path; deterministic local fallbacks keep
//! the crate usable offline and in tests.

pub mod embedder;
pub mod generator;
pub mod reranker;
pub mod tokenizer;

pub use embedder::{Embedder, HashEmbedder, OpenAiEmbedder};
pub use generator::{Generator, OpenAiGenerator, SamplingParams};
pub use reranker::{EmbeddingReranker, Reranker};
pub use tokenizer::{Tokenizer, WordTokenizer};
