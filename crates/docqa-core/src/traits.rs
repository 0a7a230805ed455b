//! Core traits for docqa components.
//!
//! - [`ContentExtractor`]: Extract text from one family of formats
//! - [`OcrEngine`] / [`PageRenderer`]: Recognise text in rasters, rasterise PDFs
//! - [`Embedder`]: Generate vector embeddings
//! - [`VectorStore`]: Store and search vectors
//!
//! Components are built once and shared as `Arc<dyn Trait>`, so every trait
//! is object safe and `Send + Sync`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{EmbedError, ExtractError, StoreError};
use crate::types::{
    DistanceMetric, EmbeddingConfig, EmbeddingOutput, ExtractedContent, IndexEntry, SearchQuery,
    SearchResult, StoreStats, UpsertOutcome,
};

// ============================================================================
// Content Extraction
// ============================================================================

/// Trait for extracting content from files.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Returns the MIME types this extractor can handle.
    fn supported_types(&self) -> &[&str];

    /// Check if this extractor can handle the given file.
    fn can_extract(&self, path: &Path, mime_type: &str) -> bool {
        self.supported_types().contains(&mime_type) || self.can_extract_by_extension(path)
    }

    /// Check if extractor can handle based on file extension.
    fn can_extract_by_extension(&self, _path: &Path) -> bool {
        false
    }

    /// Extract content from a file.
    async fn extract(&self, path: &Path) -> Result<ExtractedContent, ExtractError>;
}

// ============================================================================
// OCR
// ============================================================================

/// Recognises text in a raster image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Recognise the text in an image file.
    async fn recognize_image(&self, image: &Path) -> Result<String, ExtractError>;
}

/// Rasterises PDF pages for OCR.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render every page of `pdf` into `out_dir`, returning the images in page order.
    async fn render_pdf_pages(&self, pdf: &Path, out_dir: &Path)
        -> Result<Vec<PathBuf>, ExtractError>;
}

// ============================================================================
// Embedding
// ============================================================================

/// Trait for generating embeddings.
///
/// Implementations must be deterministic: the same text yields the same
/// vector, and every vector has length [`Embedder::dimension`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Maximum tokens per input.
    fn max_tokens(&self) -> usize;

    /// Embed text content.
    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError>;

    /// Embed a query.
    async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        let results = self.embed_text(&[query], config).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("empty embedding result".to_string()))
    }
}

// ============================================================================
// Vector Storage
// ============================================================================

/// Trait for vector storage and search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Initialize the store, recovering persisted state.
    async fn init(&self) -> Result<(), StoreError>;

    /// Metric applied to every query.
    fn metric(&self) -> DistanceMetric;

    /// Embedding dimension, if an entry has been written.
    async fn dimension(&self) -> Option<usize>;

    /// Insert or replace an entry by identifier. Durable on return.
    async fn upsert(&self, entry: &IndexEntry) -> Result<UpsertOutcome, StoreError>;

    /// Nearest entries by ascending distance, ties in insertion order.
    async fn query(&self, query: SearchQuery) -> Result<Vec<SearchResult>, StoreError>;

    /// Fetch an entry by identifier.
    async fn get(&self, id: &str) -> Result<Option<IndexEntry>, StoreError>;

    /// Number of stored entries.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Get store statistics.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
