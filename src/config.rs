//! Configuration for the RAG pipelines
//!
//! Loads persistent settings from an optional `docrag.yml` file and
//! falls back to built-in defaults. Per-request retrieval settings live
//! in [`AnswerOptions`], an explicit struct enumerating every recognized
//! knob (no free-form dicts).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Embedding dimension expected by the vector index.
pub const EMBEDDING_DIM: usize = 384;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "docrag.yml";

/// Which corpus a retrieval targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    /// Session-scoped corpus of user-uploaded documents.
    User,
    /// Curated, largely static database corpus.
    Db,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::User => "user",
            SourceKind::Db => "db",
        }
    }

    /// Parse a comma-separated source list ("user,db").
    pub fn parse_list(value: &str) -> Result<Vec<SourceKind>> {
        let mut sources = Vec::new();
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            sources.push(part.parse()?);
        }
        if sources.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one source is required".to_string(),
            ));
        }
        Ok(sources)
    }
}

impl std::str::FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(SourceKind::User),
            "db" => Ok(SourceKind::Db),
            other => Err(Error::InvalidArgument(format!(
                "unknown source '{}' (expected 'user' or 'db')",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval method, used to namespace cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Rag,
    Hyde,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Rag => "rag",
            Method::Hyde => "hyde",
        }
    }
}

/// Per-request retrieval and generation settings.
#[derive(Debug, Clone)]
pub struct AnswerOptions {
    /// Corpora to retrieve from, in requested order.
    pub sources: Vec<SourceKind>,
    /// Number of passages to retrieve per source.
    pub top_k: usize,
    /// Max new tokens for the final answer.
    pub max_length: usize,
    /// Sampling temperature (ignored when `do_sample` is off).
    pub temperature: f32,
    /// Whether the generator may sample.
    pub do_sample: bool,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self {
            sources: vec![SourceKind::User, SourceKind::Db],
            top_k: 3,
            max_length: 200,
            temperature: 0.7,
            do_sample: true,
        }
    }
}

/// Pipeline-level configuration (paths, chunking, model names).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Snapshot directory for the user corpus.
    pub user_store: PathBuf,
    /// Snapshot directory for the database corpus.
    pub db_store: PathBuf,
    /// Persisted answer cache file.
    pub cache_file: PathBuf,
    /// Chunk size in characters.
    pub chunk_size: usize,
    /// Overlap carried between chunks, in characters.
    pub chunk_overlap: usize,
    /// Token budget for a single context segment.
    pub max_segment_tokens: usize,
    /// Score retrieval candidates with BM25 instead of the vector index.
    pub use_bm25: bool,
    /// Build one prompt from all context passages (off = one generator
    /// call per passage, outputs concatenated).
    pub concat_answers: bool,
    /// Embedding model name.
    pub embedding_model: String,
    /// Generator model name.
    pub generator_model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            user_store: PathBuf::from("data/user_store"),
            db_store: PathBuf::from("data/db_store"),
            cache_file: PathBuf::from("data/answer_cache.json"),
            chunk_size: 400,
            chunk_overlap: 50,
            max_segment_tokens: 400,
            use_bm25: false,
            concat_answers: true,
            embedding_model: "text-embedding-3-small".to_string(),
            generator_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load from `docrag.yml` if present, otherwise defaults.
    pub fn load() -> Self {
        match Self::from_file(Path::new(CONFIG_FILE)) {
            Ok(config) => config,
            Err(Error::IoError(_)) => {
                debug!("{} not found, using default configuration", CONFIG_FILE);
                Self::default()
            }
            Err(err) => {
                warn!("Failed to parse {}: {}, using defaults", CONFIG_FILE, err);
                Self::default()
            }
        }
    }

    /// Load from an explicit YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw).map_err(|e| Error::ConfigError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_round_trip() {
        assert_eq!("user".parse::<SourceKind>().unwrap(), SourceKind::User);
        assert_eq!("DB".parse::<SourceKind>().unwrap(), SourceKind::Db);
        assert_eq!(SourceKind::User.as_str(), "user");
        assert_eq!(SourceKind::Db.to_string(), "db");
    }

    #[test]
    fn source_kind_rejects_unknown() {
        assert!("pdf".parse::<SourceKind>().is_err());
    }

    #[test]
    fn parse_list_splits_and_trims() {
        let sources = SourceKind::parse_list("user, db").unwrap();
        assert_eq!(sources, vec![SourceKind::User, SourceKind::Db]);
    }

    #[test]
    fn parse_list_rejects_empty() {
        assert!(SourceKind::parse_list(" , ").is_err());
    }

    #[test]
    fn default_options_are_sane() {
        let opts = AnswerOptions::default();
        assert_eq!(opts.top_k, 3);
        assert_eq!(opts.max_length, 200);
        assert_eq!(opts.sources.len(), 2);
        assert!(opts.temperature >= 0.0 && opts.temperature <= 1.0);
    }

    #[test]
    fn default_config_paths() {
        let config = PipelineConfig::default();
        assert!(config.user_store.ends_with("user_store"));
        assert!(config.db_store.ends_with("db_store"));
        assert_eq!(config.chunk_size, 400);
        assert!(!config.use_bm25);
    }

    #[test]
    fn config_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docrag.yml");
        std::fs::write(&path, "chunk_size: 256\nuse_bm25: true\n").unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.chunk_size, 256);
        assert!(config.use_bm25);
        // Unspecified fields fall back to defaults
        assert_eq!(config.chunk_overlap, 50);
    }

    #[test]
    fn method_names() {
        assert_eq!(Method::Rag.as_str(), "rag");
        assert_eq!(Method::Hyde.as_str(), "hyde");
    }
}
