//! Extractor registry and the never-failing document extractor.

use docqa_core::{
    ContentExtractor, DocumentKind, ExtractError, ExtractedContent, Extraction,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::image::ImageExtractor;
use crate::ocr::OcrService;
use crate::pdf::PdfExtractor;
use crate::text::TextExtractor;

/// Registry of content extractors.
pub struct ExtractorRegistry {
    /// Named extractors
    extractors: HashMap<String, Arc<dyn ContentExtractor>>,
    /// MIME type to extractor name mapping
    mime_mapping: HashMap<String, String>,
    /// Extractor used when nothing else claims a file
    fallback: Option<String>,
}

impl ExtractorRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
            mime_mapping: HashMap::new(),
            fallback: None,
        }
    }

    /// Registry with the text, PDF and image extractors, falling back to text.
    /// Without `ocr`, blank PDFs stay blank and images cannot be read.
    #[must_use]
    pub fn standard(ocr: Option<Arc<OcrService>>) -> Self {
        let mut registry = Self::new();
        registry.register("text", TextExtractor::new());
        match ocr {
            Some(ocr) => {
                registry.register("pdf", PdfExtractor::with_ocr(ocr.clone()));
                registry.register("image", ImageExtractor::with_ocr(ocr));
            }
            None => {
                registry.register("pdf", PdfExtractor::new());
                registry.register("image", ImageExtractor::new());
            }
        }
        registry.set_fallback("text");
        registry
    }

    /// Register an extractor.
    pub fn register<E: ContentExtractor + 'static>(&mut self, name: &str, extractor: E) {
        let extractor = Arc::new(extractor);
        for mime in extractor.supported_types() {
            self.mime_mapping
                .insert((*mime).to_string(), name.to_string());
        }
        self.extractors.insert(name.to_string(), extractor);
    }

    /// Use the named extractor for files no other extractor claims.
    pub fn set_fallback(&mut self, name: &str) {
        self.fallback = Some(name.to_string());
    }

    /// Get an extractor for a MIME type.
    #[must_use]
    pub fn get_for_mime(&self, mime_type: &str) -> Option<Arc<dyn ContentExtractor>> {
        self.mime_mapping
            .get(mime_type)
            .and_then(|name| self.extractors.get(name))
            .cloned()
    }

    /// Get an extractor that can handle a file: exact MIME type, then any
    /// extractor claiming the MIME family or extension, then the fallback.
    #[must_use]
    pub fn get_for_file(&self, path: &Path, mime_type: &str) -> Option<Arc<dyn ContentExtractor>> {
        if let Some(extractor) = self.get_for_mime(mime_type) {
            return Some(extractor);
        }

        for extractor in self.extractors.values() {
            if extractor.can_extract(path, mime_type) {
                return Some(extractor.clone());
            }
        }

        self.fallback
            .as_ref()
            .and_then(|name| self.extractors.get(name))
            .cloned()
    }

    /// Extract content from a file.
    pub async fn extract(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<ExtractedContent, ExtractError> {
        let extractor = self
            .get_for_file(path, mime_type)
            .ok_or_else(|| ExtractError::UnsupportedType(mime_type.to_string()))?;

        extractor.extract(path).await
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Front door for extraction.
///
/// Resolves the document kind from the declared type and extension, routes
/// through an [`ExtractorRegistry`], and folds every failure into the
/// returned [`Extraction`].
pub struct DocumentExtractor {
    registry: ExtractorRegistry,
}

impl DocumentExtractor {
    #[must_use]
    pub fn new(registry: ExtractorRegistry) -> Self {
        Self { registry }
    }

    /// Extract a file. Never fails: errors become an `[Extraction Error]`
    /// note appended to the text and recorded in [`Extraction::error`].
    pub async fn extract(&self, path: &Path, declared_type: Option<&str>) -> Extraction {
        let kind = DocumentKind::resolve(path, declared_type);
        let mime_type = declared_type
            .filter(|mime| DocumentKind::from_mime(mime).is_some())
            .map_or_else(|| kind.default_mime(path).to_string(), str::to_string);
        debug!("Extracting {:?} as {} ({})", path, kind.as_str(), mime_type);

        let content = match self.registry.extract(path, &mime_type).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Extraction of {:?} failed: {}", path, e);
                let reason = e.to_string();
                ExtractedContent {
                    text: format!("\n[Extraction Error] {reason}"),
                    error_note: Some(reason),
                    ..ExtractedContent::default()
                }
            }
        };

        Extraction::from_content(content, kind, mime_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::tests::make_pdf;
    use docqa_core::PageSource;
    use tempfile::tempdir;

    #[test]
    fn test_new_registry_is_empty() {
        let registry = ExtractorRegistry::new();
        assert!(registry.extractors.is_empty());
        assert!(registry.mime_mapping.is_empty());
        assert!(registry.fallback.is_none());
    }

    #[test]
    fn test_register_extractor() {
        let mut registry = ExtractorRegistry::new();
        registry.register("text", TextExtractor::new());

        assert!(registry.extractors.contains_key("text"));
        assert!(registry.mime_mapping.contains_key("text/plain"));
    }

    #[test]
    fn test_get_for_mime_nonexistent() {
        let registry = ExtractorRegistry::new();
        assert!(registry.get_for_mime("video/mp4").is_none());
    }

    #[test]
    fn test_get_for_file_unknown_type_without_fallback() {
        let mut registry = ExtractorRegistry::new();
        registry.register("pdf", PdfExtractor::new());
        let extractor = registry.get_for_file(Path::new("/test/file.xyz"), "application/unknown");
        assert!(extractor.is_none());
    }

    #[test]
    fn test_standard_registry_routes_by_kind() {
        let registry = ExtractorRegistry::standard(None);

        let pdf = registry.get_for_file(Path::new("x"), "application/pdf").unwrap();
        assert!(pdf.supported_types().contains(&"application/pdf"));

        let image = registry.get_for_file(Path::new("x"), "image/png").unwrap();
        assert!(image.supported_types().contains(&"image/png"));

        let other = registry
            .get_for_file(Path::new("x.bin"), "application/octet-stream")
            .unwrap();
        assert!(other.supported_types().contains(&"text/plain"));
    }

    #[tokio::test]
    async fn test_extract_unsupported_type() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("test.bin");
        std::fs::write(&file_path, [0u8; 10]).unwrap();

        let registry = ExtractorRegistry::new();

        match registry.extract(&file_path, "application/octet-stream").await {
            Err(ExtractError::UnsupportedType(mime)) => {
                assert_eq!(mime, "application/octet-stream");
            }
            other => panic!("Expected UnsupportedType error, got {other:?}"),
        }
    }

    // ========== DocumentExtractor Tests ==========

    #[tokio::test]
    async fn test_document_extractor_plain_text() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("hello.txt");
        std::fs::write(&file_path, "hello world").unwrap();

        let extractor = DocumentExtractor::new(ExtractorRegistry::standard(None));
        let extraction = extractor.extract(&file_path, Some("text/plain")).await;

        assert_eq!(extraction.text, "hello world");
        assert_eq!(extraction.metadata.length, 11);
        assert_eq!(extraction.metadata.kind, DocumentKind::Text);
        assert!(extraction.error.is_none());
    }

    #[tokio::test]
    async fn test_document_extractor_unknown_type_reads_text() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("NOTES");
        std::fs::write(&file_path, "plain notes").unwrap();

        let extractor = DocumentExtractor::new(ExtractorRegistry::standard(None));
        let extraction = extractor
            .extract(&file_path, Some("application/octet-stream"))
            .await;

        assert_eq!(extraction.text, "plain notes");
        assert_eq!(extraction.metadata.mime_type, "text/plain");
    }

    #[tokio::test]
    async fn test_document_extractor_missing_file_never_fails() {
        let extractor = DocumentExtractor::new(ExtractorRegistry::standard(None));
        let extraction = extractor
            .extract(Path::new("/nonexistent/doc.txt"), None)
            .await;

        assert!(extraction.text.starts_with("\n[Extraction Error] "));
        assert!(extraction.error.is_some());
        assert_eq!(
            extraction.metadata.length,
            extraction.text.chars().count()
        );
    }

    #[tokio::test]
    async fn test_document_extractor_image_without_ocr_records_error() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("scan.png");
        std::fs::write(&file_path, b"whatever").unwrap();

        let extractor = DocumentExtractor::new(ExtractorRegistry::standard(None));
        let extraction = extractor.extract(&file_path, None).await;

        assert_eq!(extraction.metadata.kind, DocumentKind::Image);
        assert!(extraction.text.contains("[Extraction Error]"));
        assert!(extraction.error.unwrap().contains("OCR is disabled"));
    }

    #[tokio::test]
    async fn test_document_extractor_pdf_metadata() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("upload.bin");
        std::fs::write(&file_path, make_pdf(&[Some("Quarterly report")])).unwrap();

        let extractor = DocumentExtractor::new(ExtractorRegistry::standard(None));
        let extraction = extractor
            .extract(&file_path, Some("application/pdf"))
            .await;

        assert_eq!(extraction.metadata.kind, DocumentKind::Pdf);
        assert!(extraction.text.contains("Quarterly report"));
        assert_eq!(extraction.metadata.pages.len(), 1);
        assert_eq!(extraction.metadata.pages[0].source, PageSource::Text);
        assert!(!extraction.metadata.ocr_applied);
    }
}
