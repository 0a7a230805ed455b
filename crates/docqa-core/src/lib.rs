//! # docqa-core
//!
//! Core types and traits for docqa, a document ingestion and semantic
//! retrieval pipeline.
//!
//! ## Architecture
//!
//! ```text
//! File → ContentExtractor ─(OCR fallback)→ Embedder → VectorStore
//!                                                          ↓
//!                       Question → Embedder → SearchQuery → SearchResult
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Extraction`] | Extracted text, metadata and recovered error |
//! | [`IndexEntry`] | A stored document with its embedding |
//! | [`SearchQuery`] | Parameters for a k-NN search |
//! | [`SearchResult`] | A ranked hit with its distance |
//! | [`IngestError`] | A failed ingestion tagged with the document id |
//!
//! ## Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`ContentExtractor`] | Extract text from a file format |
//! | [`OcrEngine`] | Recognise text in images |
//! | [`PageRenderer`] | Rasterise PDF pages |
//! | [`Embedder`] | Generate vector embeddings |
//! | [`VectorStore`] | Store and search vector embeddings |
//!
//! ## Related Crates
//!
//! - `docqa-extract`: Format extractors and the OCR fallback
//! - `docqa-embed`: Candle and hashing embedders
//! - `docqa-store`: `LanceDB` and in-memory vector stores
//! - `docqa-index`: Ingestion path
//! - `docqa-query`: Query path

pub mod error;
pub mod traits;
pub mod types;

pub use error::{EmbedError, Error, ExtractError, IngestError, Result, StoreError};
pub use traits::*;
pub use types::*;
