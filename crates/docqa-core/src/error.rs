//! Error types for docqa.
//!
//! Extraction errors never leave the extraction layer (they are folded into
//! an [`Extraction`](crate::Extraction) note). Embedding and store errors
//! fail the request that hit them and are reported to the caller.

use std::time::Duration;

use thiserror::Error;

/// Main error type for docqa operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Content extraction failed
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// Vector store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Content extraction errors.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ocr failed: {0}")]
    Ocr(String),

    #[error("page rendering failed: {0}")]
    Render(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("input too long: {tokens} tokens, max {max}")]
    InputTooLong { tokens: usize, max: usize },

    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),
}

/// Vector store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("insert failed: {0}")]
    Insert(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("embedding dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A failed ingestion, tagged with the document identifier.
#[derive(Error, Debug)]
#[error("ingestion of '{id}' failed: {source}")]
pub struct IngestError {
    /// Identifier the caller asked to ingest
    pub id: String,
    /// Underlying reason
    #[source]
    pub source: Error,
}

impl IngestError {
    /// Tag an error with the document identifier.
    pub fn new(id: impl Into<String>, source: impl Into<Error>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
        }
    }

    /// Human-readable reason without the identifier prefix.
    #[must_use]
    pub fn reason(&self) -> String {
        self.source.to_string()
    }
}

/// Result type alias for docqa operations.
pub type Result<T> = std::result::Result<T, Error>;
