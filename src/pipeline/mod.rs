//! Retrieval-and-answer orchestrators: direct RAG, HyDE and the
//! graph-restricted fallback.

pub mod graph_rag;
pub mod rag;

pub use graph_rag::{GraphDecision, GraphRagPipeline, GRAPH_NOT_BUILT_ANSWER};
pub use rag::{RagPipeline, NO_CONTEXT_ANSWER};
