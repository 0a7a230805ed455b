//! Image content extractor.
//!
//! Images have no text layer, so the text is whatever OCR recognises. The
//! file header is read first so that non-images fail fast instead of
//! reaching the OCR engine.

use async_trait::async_trait;
use docqa_core::{ContentExtractor, ExtractError, ExtractedContent};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::ocr::OcrService;

/// Extractor for image files.
pub struct ImageExtractor {
    ocr: Option<Arc<OcrService>>,
}

impl ImageExtractor {
    /// Image extractor with no OCR engine; every extraction fails.
    #[must_use]
    pub fn new() -> Self {
        Self { ocr: None }
    }

    #[must_use]
    pub fn with_ocr(ocr: Arc<OcrService>) -> Self {
        Self { ocr: Some(ocr) }
    }
}

impl Default for ImageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for ImageExtractor {
    fn supported_types(&self) -> &[&str] {
        &[
            "image/jpeg",
            "image/png",
            "image/gif",
            "image/webp",
            "image/bmp",
            "image/tiff",
        ]
    }

    fn can_extract(&self, path: &Path, mime_type: &str) -> bool {
        mime_type.starts_with("image/") || self.can_extract_by_extension(path)
    }

    fn can_extract_by_extension(&self, path: &Path) -> bool {
        let extensions = ["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif"];

        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext.to_lowercase().as_str()))
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedContent, ExtractError> {
        debug!("Extracting image: {:?}", path);

        let ocr = self
            .ocr
            .as_ref()
            .ok_or_else(|| ExtractError::Failed("OCR is disabled".to_string()))?;

        let header_path = path.to_path_buf();
        let (width, height, format) =
            tokio::task::spawn_blocking(move || read_image_header(&header_path))
                .await
                .map_err(|e| ExtractError::Failed(format!("Task join error: {e}")))??;
        debug!("Image {:?}: {}x{} {}", path, width, height, format);

        let text = ocr.recognize_image(path).await?;

        Ok(ExtractedContent {
            text,
            ocr_applied: true,
            ..ExtractedContent::default()
        })
    }
}

/// Dimensions and format from the image header, without decoding pixels.
fn read_image_header(path: &Path) -> Result<(u32, u32, String), ExtractError> {
    let reader = image::ImageReader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| ExtractError::Parse("unrecognised image format".to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ExtractError::Parse(format!("Failed to read image header: {e}")))?;

    Ok((width, height, format!("{format:?}").to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::{OcrEngine, PageRenderer};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Create a simple 2x2 PNG image for testing
    fn create_test_png() -> Vec<u8> {
        use image::{ImageBuffer, Rgba};

        let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(2, 2, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });

        let mut bytes: Vec<u8> = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut bytes);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        bytes
    }

    struct EchoOcr;

    #[async_trait]
    impl OcrEngine for EchoOcr {
        fn name(&self) -> &str {
            "echo"
        }

        async fn recognize_image(&self, image: &Path) -> Result<String, ExtractError> {
            Ok(format!(
                "Invoice from {}",
                image.file_name().unwrap().to_string_lossy()
            ))
        }
    }

    struct NoRenderer;

    #[async_trait]
    impl PageRenderer for NoRenderer {
        async fn render_pdf_pages(
            &self,
            _pdf: &Path,
            _out_dir: &Path,
        ) -> Result<Vec<PathBuf>, ExtractError> {
            Ok(vec![])
        }
    }

    fn extractor() -> ImageExtractor {
        ImageExtractor::with_ocr(Arc::new(OcrService::new(
            Arc::new(EchoOcr),
            Arc::new(NoRenderer),
            1,
            Duration::from_secs(5),
        )))
    }

    #[test]
    fn test_can_extract_by_extension() {
        let extractor = ImageExtractor::new();

        assert!(extractor.can_extract_by_extension(Path::new("photo.jpg")));
        assert!(extractor.can_extract_by_extension(Path::new("image.PNG")));
        assert!(extractor.can_extract_by_extension(Path::new("image.tif")));
        assert!(!extractor.can_extract_by_extension(Path::new("document.txt")));
        assert!(!extractor.can_extract_by_extension(Path::new("file.pdf")));
    }

    #[test]
    fn test_can_extract_any_image_mime() {
        let extractor = ImageExtractor::new();
        assert!(extractor.can_extract(Path::new("upload"), "image/x-portable-anymap"));
    }

    #[tokio::test]
    async fn test_extract_png_runs_ocr() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("receipt.png");
        std::fs::write(&file_path, create_test_png()).unwrap();

        let content = extractor().extract(&file_path).await.unwrap();

        assert_eq!(content.text, "Invoice from receipt.png");
        assert!(content.ocr_applied);
        assert!(content.pages.is_empty());
    }

    #[tokio::test]
    async fn test_extract_invalid_image_fails() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("fake.png");
        std::fs::write(&file_path, b"not an image").unwrap();

        let result = extractor().extract(&file_path).await;
        assert!(matches!(result, Err(ExtractError::Parse(_))));
    }

    #[tokio::test]
    async fn test_extract_without_ocr_fails() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("receipt.png");
        std::fs::write(&file_path, create_test_png()).unwrap();

        let result = ImageExtractor::new().extract(&file_path).await;
        assert!(matches!(result, Err(ExtractError::Failed(_))));
    }

    #[test]
    fn test_read_image_header() {
        let temp_dir = tempdir().unwrap();
        // extension deliberately wrong; the format comes from the magic bytes
        let file_path = temp_dir.path().join("photo.dat");
        std::fs::write(&file_path, create_test_png()).unwrap();

        let (w, h, format) = read_image_header(&file_path).unwrap();
        assert_eq!((w, h), (2, 2));
        assert_eq!(format, "png");
    }

    #[test]
    fn test_read_image_header_rejects_non_image() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("notes.png");
        std::fs::write(&file_path, b"plain words").unwrap();

        assert!(matches!(
            read_image_header(&file_path),
            Err(ExtractError::Parse(_))
        ));
    }
}
