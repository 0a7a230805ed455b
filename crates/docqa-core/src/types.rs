//! Core types for docqa.
//!
//! ## Documents
//! - [`DocumentKind`]: Format family that decides the extraction path
//! - [`PageMarker`]: Where a page starts inside the extracted text
//!
//! ## Extraction
//! - [`ExtractedContent`]: What a single format extractor produced
//! - [`Extraction`]: Final never-failing result handed to the pipeline
//!
//! ## Embeddings
//! - [`EmbeddingConfig`]: Configuration for embedding generation
//! - [`EmbeddingOutput`]: Result of embedding a text
//!
//! ## Index
//! - [`IndexEntry`]: A stored document with its embedding
//! - [`SearchQuery`] / [`SearchResult`]: k-NN request and ranked hit
//! - [`DistanceMetric`]: Vector distance calculation method
//!
//! ## Interfaces
//! - [`Answer`] / [`AnswerSet`]: Query response shape
//! - [`UploadResponse`]: Ingestion response shape

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Documents
// ============================================================================

/// Format family of an ingested file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Portable Document Format
    Pdf,
    /// Raster image, read through OCR
    Image,
    /// Anything else, read as UTF-8
    #[default]
    Text,
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp", "pnm", "pbm", "pgm", "ppm",
];

impl DocumentKind {
    /// Classify a declared MIME type. Returns `None` for types that say
    /// nothing useful (empty, `application/octet-stream`, unknown).
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mime == "application/pdf" || mime == "application/x-pdf" {
            Some(Self::Pdf)
        } else if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("text/")
            || mime == "application/json"
            || mime == "application/xml"
            || mime == "application/x-yaml"
        {
            Some(Self::Text)
        } else {
            None
        }
    }

    /// Classify by file extension.
    #[must_use]
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if ext == "pdf" {
            Some(Self::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else {
            Some(Self::Text)
        }
    }

    /// Resolve the kind: declared MIME type first, then extension, then `Text`.
    #[must_use]
    pub fn resolve(path: &Path, declared: Option<&str>) -> Self {
        declared
            .and_then(Self::from_mime)
            .or_else(|| Self::from_extension(path))
            .unwrap_or_default()
    }

    /// MIME type used when the caller declared none.
    #[must_use]
    pub fn default_mime(self, path: &Path) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Image => match path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .as_deref()
            {
                Some("jpg" | "jpeg") => "image/jpeg",
                Some("gif") => "image/gif",
                Some("bmp") => "image/bmp",
                Some("tif" | "tiff") => "image/tiff",
                Some("webp") => "image/webp",
                _ => "image/png",
            },
            Self::Text => "text/plain",
        }
    }

    /// Lowercase name used in logs and stored metadata.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Text => "text",
        }
    }
}

/// How the text of a page was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSource {
    /// Read from the document's text layer
    Text,
    /// Recognised from a rendered raster of the page
    Ocr,
}

/// Start of a page inside extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMarker {
    /// Page number (1-indexed)
    pub page: u32,
    /// Byte offset of the marker line in the final text
    pub byte_offset: u64,
    /// Which extraction stage produced the page
    pub source: PageSource,
}

// ============================================================================
// Extraction
// ============================================================================

/// Content produced by one format extractor.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    /// Main text content
    pub text: String,
    /// Page markers in text order (empty for non-paged formats)
    pub pages: Vec<PageMarker>,
    /// Whether any of the text came from OCR
    pub ocr_applied: bool,
    /// Recovered failure, already appended to `text` where applicable
    pub error_note: Option<String>,
}

impl ExtractedContent {
    /// Plain text with no page structure.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Append a `[Page N]` style header and record the marker.
    pub fn push_page(&mut self, page: u32, source: PageSource, body: &str) {
        let label = match source {
            PageSource::Text => "Page",
            PageSource::Ocr => "OCR Page",
        };
        self.pages.push(PageMarker {
            page,
            byte_offset: self.text.len() as u64,
            source,
        });
        self.text.push_str(&format!("\n[{label} {page}]\n"));
        self.text.push_str(body);
        if source == PageSource::Ocr {
            self.ocr_applied = true;
        }
    }
}

/// Metadata describing an [`Extraction`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    /// Length of the final text in characters
    pub length: usize,
    /// Page markers in text order
    pub pages: Vec<PageMarker>,
    /// Resolved format family
    pub kind: DocumentKind,
    /// Declared or inferred MIME type
    pub mime_type: String,
    /// Whether OCR produced any of the text
    pub ocr_applied: bool,
}

/// Result of extracting a file. Never an error; failures travel in `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    /// Extracted text, possibly empty or partial
    pub text: String,
    /// Extraction metadata
    pub metadata: ExtractionMetadata,
    /// Reason the text is empty or partial, if any
    pub error: Option<String>,
}

impl Extraction {
    /// Build the final result from extractor output.
    #[must_use]
    pub fn from_content(
        content: ExtractedContent,
        kind: DocumentKind,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            metadata: ExtractionMetadata {
                length: content.text.chars().count(),
                pages: content.pages,
                kind,
                mime_type: mime_type.into(),
                ocr_applied: content.ocr_applied,
            },
            text: content.text,
            error: content.error_note,
        }
    }
}

// ============================================================================
// Embedding
// ============================================================================

/// Configuration for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Normalize embeddings to unit length
    pub normalize: bool,
    /// Batch size for processing
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            batch_size: 32,
        }
    }
}

/// Output from embedding.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// The embedding vector
    pub embedding: Vec<f32>,
    /// Number of tokens in input
    pub token_count: usize,
}

// ============================================================================
// Index
// ============================================================================

/// Metadata stored alongside an index entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Length of the text in characters
    pub char_length: usize,
    /// Page markers from extraction
    #[serde(default)]
    pub pages: Vec<PageMarker>,
    /// Format family
    pub kind: DocumentKind,
    /// MIME type the document was ingested as
    pub mime_type: String,
    /// Whether OCR produced any of the text
    #[serde(default)]
    pub ocr_applied: bool,
    /// Embedding model used
    pub embedding_model: Option<String>,
    /// When the entry was written
    pub indexed_at: Option<DateTime<Utc>>,
}

/// A document as persisted in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Unique document identifier
    pub id: String,
    /// Raw extracted text
    pub text: String,
    /// Embedding vector
    pub embedding: Vec<f32>,
    /// Document metadata
    pub metadata: DocumentMetadata,
}

/// Whether an upsert created or replaced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// A k-NN query.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Query embedding
    pub embedding: Vec<f32>,
    /// Maximum results to return
    pub limit: usize,
}

/// Distance metric for vector search. Smaller is closer for every variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance
    #[default]
    L2,
    /// `1 - cosine similarity`; a zero vector is at distance 1
    Cosine,
    /// `1 - dot product`
    Dot,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_a * norm_b)
                }
            }
            Self::Dot => 1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Cosine => "cosine",
            Self::Dot => "dot",
        }
    }
}

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Document identifier
    pub id: String,
    /// Stored text
    pub text: String,
    /// Distance to the query under the store's metric
    pub distance: f32,
}

/// Vector store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of stored entries
    pub total_entries: u64,
    /// Embedding dimension, once fixed by the first upsert
    pub dimension: Option<usize>,
    /// Metric applied to queries
    pub metric: DistanceMetric,
    /// Last write time seen by this process
    pub last_updated: Option<DateTime<Utc>>,
}

// ============================================================================
// Ingestion
// ============================================================================

/// Running ingestion counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    /// Documents written to the index
    pub ingested: u64,
    /// Ingestions that failed to encode or write
    pub failed: u64,
    /// Documents whose text came at least partly from OCR
    pub ocr_documents: u64,
    /// Documents whose extraction recorded an error note
    pub extraction_warnings: u64,
    /// Time of the last successful ingestion
    pub last_ingest: Option<DateTime<Utc>>,
}

// ============================================================================
// Interface shapes
// ============================================================================

/// Outcome reported for an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploaded,
    Failed,
}

/// Response body for an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub identifier: String,
    pub status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResponse {
    #[must_use]
    pub fn uploaded(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            status: UploadStatus::Uploaded,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(identifier: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            status: UploadStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// One ranked answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Document identifier
    pub document: String,
    /// Stored text of the document
    pub extracted_answer: String,
    /// Distance to the question
    pub distance: f32,
}

impl From<SearchResult> for Answer {
    fn from(result: SearchResult) -> Self {
        Self {
            document: result.id,
            extracted_answer: result.text,
            distance: result.distance,
        }
    }
}

/// Response body for a question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerSet {
    pub answers: Vec<Answer>,
}
