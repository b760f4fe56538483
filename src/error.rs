//! Error types for the docrag core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No persist path configured for this index")]
    MissingPersistPath,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Embedding backend error: {0}")]
    EmbeddingError(String),

    #[error("Generation backend error: {0}")]
    GenerationError(String),

    #[error("Reranker backend error: {0}")]
    RerankError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
