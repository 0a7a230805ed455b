//! # docqa-extract
//!
//! Text extraction for the docqa ingestion pipeline.
//!
//! ## Supported Formats
//!
//! | Extractor | Formats | Strategy |
//! |-----------|---------|----------|
//! | [`TextExtractor`] | `text/*`, `.txt`, `.md`, `.json`, ... and anything unrecognised | UTF-8 read |
//! | [`PdfExtractor`] | `.pdf` | Text layer per page, OCR fallback when blank |
//! | [`ImageExtractor`] | `.png`, `.jpg`, `.tiff`, ... | OCR |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docqa_extract::{DocumentExtractor, ExtractorRegistry, OcrService, OcrSettings};
//! use std::sync::Arc;
//!
//! let ocr = Arc::new(OcrService::external(&OcrSettings::default()));
//! let extractor = DocumentExtractor::new(ExtractorRegistry::standard(Some(ocr)));
//!
//! let extraction = extractor.extract(Path::new("scan.pdf"), Some("application/pdf")).await;
//! println!("{} chars, error: {:?}", extraction.metadata.length, extraction.error);
//! ```
//!
//! ## OCR
//!
//! [`OcrService`] wraps an [`OcrEngine`](docqa_core::OcrEngine) and a
//! [`PageRenderer`](docqa_core::PageRenderer). The defaults shell out to
//! `tesseract` and `pdftoppm` (poppler-utils).

pub mod image;
pub mod ocr;
pub mod pdf;
pub mod registry;
pub mod text;

pub use image::ImageExtractor;
pub use ocr::{OcrService, OcrSettings, PdftoppmRenderer, TesseractOcr};
pub use pdf::{needs_ocr_fallback, PdfExtractor};
pub use registry::{DocumentExtractor, ExtractorRegistry};
pub use text::TextExtractor;
