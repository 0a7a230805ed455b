//! PDF content extractor.
//!
//! Two stages:
//!
//! 1. Read the text layer page by page with lopdf. Pages with text are
//!    appended under a `[Page N]` header.
//! 2. If the result is blank ([`needs_ocr_fallback`]), rasterise every page
//!    and OCR it, appending each under an `[OCR Page N]` header.
//!
//! Any failure on this path is logged and appended to the text as
//! `[OCR Fallback Error] <reason>`; whatever was extracted before the failure
//! is kept.

use async_trait::async_trait;
use docqa_core::{ContentExtractor, ExtractError, ExtractedContent, PageSource};
use lopdf::Document;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::ocr::OcrService;

/// Whether the text layer is too thin to use and OCR should run.
#[must_use]
pub fn needs_ocr_fallback(text: &str) -> bool {
    text.trim().is_empty()
}

/// Extractor for PDF files.
pub struct PdfExtractor {
    ocr: Option<Arc<OcrService>>,
}

impl PdfExtractor {
    /// PDF extractor without OCR fallback.
    #[must_use]
    pub fn new() -> Self {
        Self { ocr: None }
    }

    /// PDF extractor that falls back to `ocr` for pages without a text layer.
    #[must_use]
    pub fn with_ocr(ocr: Arc<OcrService>) -> Self {
        Self { ocr: Some(ocr) }
    }

    async fn extract_into(
        &self,
        path: &Path,
        content: &mut ExtractedContent,
    ) -> Result<(), ExtractError> {
        let bytes = tokio::fs::read(path).await?;

        let pages = tokio::task::spawn_blocking(move || extract_page_texts(&bytes))
            .await
            .map_err(|e| ExtractError::Failed(format!("Task join error: {e}")))??;

        let page_count = pages.len();
        for (page, text) in pages {
            if !text.trim().is_empty() {
                content.push_page(page, PageSource::Text, &text);
            }
        }
        debug!(
            "Text layer of {:?}: {} of {} pages with text",
            path,
            content.pages.len(),
            page_count
        );

        if !needs_ocr_fallback(&content.text) {
            return Ok(());
        }

        match &self.ocr {
            Some(ocr) => {
                info!(
                    "No text layer in {:?}, falling back to {} OCR",
                    path,
                    ocr.engine_name()
                );
                ocr.ocr_pdf_into(path, content).await?;
            }
            None => {
                debug!("No text layer in {:?} and OCR is disabled", path);
                content.error_note = Some("no text layer found and OCR is disabled".to_string());
            }
        }

        Ok(())
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for PdfExtractor {
    fn supported_types(&self) -> &[&str] {
        &["application/pdf", "application/x-pdf"]
    }

    fn can_extract_by_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedContent, ExtractError> {
        debug!("Extracting PDF: {:?}", path);

        let mut content = ExtractedContent::default();
        if let Err(e) = self.extract_into(path, &mut content).await {
            error!("OCR fallback error for {:?}: {}", path, e);
            let reason = e.to_string();
            content.text.push_str("\n[OCR Fallback Error] ");
            content.text.push_str(&reason);
            content.error_note = Some(reason);
        }

        Ok(content)
    }
}

/// Text of every page, in page order. A page whose text cannot be decoded
/// counts as empty.
fn extract_page_texts(bytes: &[u8]) -> Result<Vec<(u32, String)>, ExtractError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| ExtractError::Parse(format!("Failed to load PDF: {e}")))?;

    Ok(doc
        .get_pages()
        .into_keys()
        .map(|page| {
            let text = doc.extract_text(&[page]).unwrap_or_else(|e| {
                debug!("No text from page {}: {}", page, e);
                String::new()
            });
            (page, text)
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use docqa_core::{OcrEngine, PageRenderer};
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Build a PDF with one page per entry; `None` pages have an empty
    /// content stream (no text layer).
    pub(crate) fn make_pdf(pages: &[Option<&str>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let operations = match text {
                Some(text) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
                None => vec![],
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    struct StubRenderer;

    #[async_trait]
    impl PageRenderer for StubRenderer {
        async fn render_pdf_pages(
            &self,
            pdf: &Path,
            out_dir: &Path,
        ) -> Result<Vec<PathBuf>, ExtractError> {
            let bytes = tokio::fs::read(pdf).await?;
            let doc = Document::load_mem(&bytes)
                .map_err(|e| ExtractError::Render(e.to_string()))?;
            let mut out = Vec::new();
            for page in doc.get_pages().into_keys() {
                let path = out_dir.join(format!("page-{page}.png"));
                tokio::fs::write(&path, b"raster").await?;
                out.push(path);
            }
            Ok(out)
        }
    }

    struct StubOcr {
        result: Result<String, String>,
    }

    #[async_trait]
    impl OcrEngine for StubOcr {
        fn name(&self) -> &str {
            "stub"
        }

        async fn recognize_image(&self, _image: &Path) -> Result<String, ExtractError> {
            self.result.clone().map_err(ExtractError::Ocr)
        }
    }

    fn extractor_with_ocr(result: Result<&str, &str>) -> PdfExtractor {
        let engine = StubOcr {
            result: result.map(str::to_string).map_err(str::to_string),
        };
        PdfExtractor::with_ocr(Arc::new(OcrService::new(
            Arc::new(engine),
            Arc::new(StubRenderer),
            1,
            Duration::from_secs(5),
        )))
    }

    fn write_pdf(dir: &Path, name: &str, pages: &[Option<&str>]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, make_pdf(pages)).unwrap();
        path
    }

    #[test]
    fn test_needs_ocr_fallback() {
        assert!(needs_ocr_fallback(""));
        assert!(needs_ocr_fallback("  \n\t "));
        assert!(!needs_ocr_fallback("x"));
    }

    #[test]
    fn test_can_extract_by_extension() {
        let extractor = PdfExtractor::new();
        assert!(extractor.can_extract_by_extension(Path::new("a.pdf")));
        assert!(extractor.can_extract_by_extension(Path::new("A.PDF")));
        assert!(!extractor.can_extract_by_extension(Path::new("a.txt")));
    }

    #[tokio::test]
    async fn test_text_layer_pages_are_marked() {
        let dir = tempdir().unwrap();
        let path = write_pdf(dir.path(), "doc.pdf", &[Some("Alpha"), None, Some("Gamma")]);

        let content = extractor_with_ocr(Ok("never used"))
            .extract(&path)
            .await
            .unwrap();

        assert!(content.text.starts_with("\n[Page 1]\n"));
        assert!(content.text.contains("Alpha"));
        assert!(content.text.contains("\n[Page 3]\n"));
        assert!(!content.text.contains("[Page 2]"));
        assert!(!content.text.contains("OCR"));
        assert_eq!(content.pages.len(), 2);
        assert!(!content.ocr_applied);
        assert!(content.error_note.is_none());
    }

    #[tokio::test]
    async fn test_blank_pdf_falls_back_to_ocr() {
        let dir = tempdir().unwrap();
        let path = write_pdf(dir.path(), "scan.pdf", &[None]);

        let content = extractor_with_ocr(Ok("Scanned"))
            .extract(&path)
            .await
            .unwrap();

        assert_eq!(content.text, "\n[OCR Page 1]\nScanned");
        assert!(content.ocr_applied);
        assert_eq!(content.pages[0].source, PageSource::Ocr);
    }

    #[tokio::test]
    async fn test_ocr_failure_is_appended_as_note() {
        let dir = tempdir().unwrap();
        let path = write_pdf(dir.path(), "scan.pdf", &[None, None]);

        let content = extractor_with_ocr(Err("engine crashed"))
            .extract(&path)
            .await
            .unwrap();

        assert!(content.text.starts_with("\n[OCR Fallback Error] "));
        assert!(content.text.contains("engine crashed"));
        assert!(content.error_note.unwrap().contains("engine crashed"));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_recovered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4 this is not a pdf").unwrap();

        let content = PdfExtractor::new().extract(&path).await.unwrap();

        assert!(content.text.contains("[OCR Fallback Error]"));
        assert!(content.error_note.is_some());
    }

    #[tokio::test]
    async fn test_blank_pdf_without_ocr_keeps_note_only() {
        let dir = tempdir().unwrap();
        let path = write_pdf(dir.path(), "scan.pdf", &[None]);

        let content = PdfExtractor::new().extract(&path).await.unwrap();

        assert_eq!(content.text, "");
        assert!(content.error_note.unwrap().contains("OCR is disabled"));
    }
}
