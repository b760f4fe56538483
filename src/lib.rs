//! docrag - hybrid RAG + GraphRAG question answering core
//!
//! This library answers natural-language questions over two local
//! corpora (user-uploaded documents and a curated database corpus):
//! - Sentence-aware chunking and dense vector indexing with snapshots
//! - Hybrid retrieval: cosine similarity or BM25 per corpus
//! - Optional second-stage reranking
//! - Token-safe generation context assembly
//! - Persistent answer cache fingerprinted by query + settings + corpus state
//! - HyDE (pseudo-answer driven retrieval)
//! - Entity-graph-restricted retrieval with explicit fallback (GraphRAG)
//!
//! Models (embedding, generation, reranking, parsing, tokenization) are
//! external collaborators injected behind traits in [`models`] and
//! [`graph::parser`].

pub mod cache;
pub mod chunker;
pub mod config;
pub mod error;
pub mod graph;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod segmenter;

// Re-export common types
pub use cache::{AnswerCache, Fingerprint};
pub use config::{AnswerOptions, Method, PipelineConfig, SourceKind, EMBEDDING_DIM};
pub use error::{Error, Result};
pub use graph::{EntityParser, GraphBuilder, HeuristicParser};
pub use index::{Bm25Index, EmbeddingIndex, Passage};
pub use models::{
    Embedder, EmbeddingReranker, Generator, HashEmbedder, OpenAiEmbedder, OpenAiGenerator,
    Reranker, SamplingParams, Tokenizer, WordTokenizer,
};
pub use pipeline::{
    GraphDecision, GraphRagPipeline, RagPipeline, GRAPH_NOT_BUILT_ANSWER, NO_CONTEXT_ANSWER,
};
