//! Retrieval indices: dense vector store and lexical BM25.

pub mod lexical;
pub mod vector;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use lexical::Bm25Index;
pub use vector::EmbeddingIndex;

/// Metadata key identifying a passage's source document.
pub const DOC_NAME_KEY: &str = "doc_name";

/// A chunk of source text with attached metadata, the atomic unit of
/// retrieval. Immutable once added to an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl Passage {
    /// Create a passage with a `doc_name` provenance entry.
    pub fn new(text: impl Into<String>, doc_name: impl Into<String>) -> Self {
        let mut meta = HashMap::new();
        meta.insert(DOC_NAME_KEY.to_string(), doc_name.into());
        Self {
            text: text.into(),
            meta,
        }
    }

    /// Source document name, or "unknown" when provenance is missing.
    pub fn doc_name(&self) -> &str {
        self.meta.get(DOC_NAME_KEY).map_or("unknown", String::as_str)
    }
}
