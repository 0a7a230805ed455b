//! OCR through external tools.
//!
//! [`TesseractOcr`] runs `tesseract <image> stdout -l <lang>` and
//! [`PdftoppmRenderer`] runs `pdftoppm -png -r <dpi>` to rasterise PDFs.
//! [`OcrService`] shares one concurrency budget and one per-command timeout
//! between the PDF fallback and the image extractor.

use async_trait::async_trait;
use docqa_core::{ExtractError, ExtractedContent, OcrEngine, PageRenderer, PageSource};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Default per-command timeout.
pub const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings for the external OCR toolchain.
#[derive(Debug, Clone)]
pub struct OcrSettings {
    /// `tesseract` binary
    pub tesseract_bin: String,
    /// `pdftoppm` binary
    pub pdftoppm_bin: String,
    /// Tesseract language code
    pub language: String,
    /// Rasterisation resolution
    pub dpi: u32,
    /// Concurrent OCR jobs across all requests
    pub max_concurrent: usize,
    /// Limit for each external command
    pub timeout: Duration,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tesseract_bin: "tesseract".to_string(),
            pdftoppm_bin: "pdftoppm".to_string(),
            language: "eng".to_string(),
            dpi: 150,
            max_concurrent: 2,
            timeout: DEFAULT_OCR_TIMEOUT,
        }
    }
}

/// Run a command to completion, killing it when the timeout fires.
async fn run_with_timeout(
    command: &mut Command,
    limit: Duration,
    what: &str,
) -> Result<Output, ExtractError> {
    command.kill_on_drop(true);
    match tokio::time::timeout(limit, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ExtractError::Failed(format!("failed to run {what}: {e}"))),
        Err(_) => Err(ExtractError::Timeout(limit)),
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

// ============================================================================
// Tesseract
// ============================================================================

/// OCR engine backed by the `tesseract` CLI.
pub struct TesseractOcr {
    binary: String,
    language: String,
    timeout: Duration,
}

impl TesseractOcr {
    #[must_use]
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            binary: settings.tesseract_bin.clone(),
            language: settings.language.clone(),
            timeout: settings.timeout,
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new(&OcrSettings::default())
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize_image(&self, image: &Path) -> Result<String, ExtractError> {
        debug!("Running tesseract on {:?}", image);

        let output = run_with_timeout(
            Command::new(&self.binary)
                .arg(image)
                .arg("stdout")
                .arg("-l")
                .arg(&self.language),
            self.timeout,
            "tesseract",
        )
        .await?;

        if !output.status.success() {
            return Err(ExtractError::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr_of(&output)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ============================================================================
// pdftoppm
// ============================================================================

/// PDF rasteriser backed by the `pdftoppm` CLI (poppler).
pub struct PdftoppmRenderer {
    binary: String,
    dpi: u32,
    timeout: Duration,
}

impl PdftoppmRenderer {
    #[must_use]
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            binary: settings.pdftoppm_bin.clone(),
            dpi: settings.dpi,
            timeout: settings.timeout,
        }
    }
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self::new(&OcrSettings::default())
    }
}

#[async_trait]
impl PageRenderer for PdftoppmRenderer {
    async fn render_pdf_pages(
        &self,
        pdf: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        debug!("Rendering {:?} at {} dpi", pdf, self.dpi);

        let output = run_with_timeout(
            Command::new(&self.binary)
                .arg("-png")
                .arg("-r")
                .arg(self.dpi.to_string())
                .arg(pdf)
                .arg(out_dir.join("page")),
            self.timeout,
            "pdftoppm",
        )
        .await?;

        if !output.status.success() {
            return Err(ExtractError::Render(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr_of(&output)
            )));
        }

        let mut images = Vec::new();
        let mut entries = tokio::fs::read_dir(out_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "png") {
                images.push(path);
            }
        }
        sort_rendered_pages(&mut images);

        Ok(images)
    }
}

/// Page number from a `pdftoppm` output name such as `page-07.png`.
fn rendered_page_number(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .rsplit('-')
        .next()?
        .parse()
        .ok()
}

fn sort_rendered_pages(images: &mut [PathBuf]) {
    images.sort_by(|a, b| {
        rendered_page_number(a)
            .cmp(&rendered_page_number(b))
            .then_with(|| a.cmp(b))
    });
}

// ============================================================================
// Service
// ============================================================================

/// Shared OCR front-end with bounded concurrency and per-job timeouts.
pub struct OcrService {
    engine: Arc<dyn OcrEngine>,
    renderer: Arc<dyn PageRenderer>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl OcrService {
    /// Create a service over arbitrary engine and renderer implementations.
    #[must_use]
    pub fn new(
        engine: Arc<dyn OcrEngine>,
        renderer: Arc<dyn PageRenderer>,
        max_concurrent: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            renderer,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    /// Service using `tesseract` and `pdftoppm`.
    #[must_use]
    pub fn external(settings: &OcrSettings) -> Self {
        Self::new(
            Arc::new(TesseractOcr::new(settings)),
            Arc::new(PdftoppmRenderer::new(settings)),
            settings.max_concurrent,
            settings.timeout,
        )
    }

    /// Name of the underlying engine.
    #[must_use]
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Recognise the text of one image.
    pub async fn recognize_image(&self, image: &Path) -> Result<String, ExtractError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ExtractError::Failed(format!("OCR pool closed: {e}")))?;

        tokio::time::timeout(self.timeout, self.engine.recognize_image(image))
            .await
            .map_err(|_| ExtractError::Timeout(self.timeout))?
    }

    /// Render every page of `pdf` and append the recognised text to `content`
    /// under `[OCR Page N]` headers.
    ///
    /// Pages are appended as they are recognised, so on error `content` keeps
    /// the pages that succeeded. Returns the number of pages recognised.
    pub async fn ocr_pdf_into(
        &self,
        pdf: &Path,
        content: &mut ExtractedContent,
    ) -> Result<usize, ExtractError> {
        let scratch = tempfile::tempdir()?;

        let pages = tokio::time::timeout(
            self.timeout,
            self.renderer.render_pdf_pages(pdf, scratch.path()),
        )
        .await
        .map_err(|_| ExtractError::Timeout(self.timeout))??;

        if pages.is_empty() {
            return Err(ExtractError::Render("renderer produced no pages".to_string()));
        }

        for (index, image) in pages.iter().enumerate() {
            let text = self.recognize_image(image).await?;
            content.push_page(index as u32 + 1, PageSource::Ocr, &text);
        }

        info!("OCR recognised {} pages of {:?}", pages.len(), pdf);
        Ok(pages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct FixedRenderer {
        pages: usize,
    }

    #[async_trait]
    impl PageRenderer for FixedRenderer {
        async fn render_pdf_pages(
            &self,
            _pdf: &Path,
            out_dir: &Path,
        ) -> Result<Vec<PathBuf>, ExtractError> {
            let mut out = Vec::new();
            for i in 1..=self.pages {
                let path = out_dir.join(format!("page-{i}.png"));
                tokio::fs::write(&path, b"png").await?;
                out.push(path);
            }
            Ok(out)
        }
    }

    /// Returns "text of page-N" and fails on the page named `fail_on`.
    struct NamingOcr {
        fail_on: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for NamingOcr {
        fn name(&self) -> &str {
            "naming"
        }

        async fn recognize_image(&self, image: &Path) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let stem = image.file_stem().unwrap().to_string_lossy().to_string();
            if self.fail_on.as_deref() == Some(stem.as_str()) {
                return Err(ExtractError::Ocr(format!("cannot read {stem}")));
            }
            Ok(format!("text of {stem}"))
        }
    }

    struct SlowOcr;

    #[async_trait]
    impl OcrEngine for SlowOcr {
        fn name(&self) -> &str {
            "slow"
        }

        async fn recognize_image(&self, _image: &Path) -> Result<String, ExtractError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    fn service(engine: Arc<dyn OcrEngine>, pages: usize, timeout: Duration) -> OcrService {
        OcrService::new(engine, Arc::new(FixedRenderer { pages }), 1, timeout)
    }

    #[test]
    fn test_sort_rendered_pages_numeric() {
        let mut pages = vec![
            PathBuf::from("/t/page-10.png"),
            PathBuf::from("/t/page-2.png"),
            PathBuf::from("/t/page-1.png"),
        ];
        sort_rendered_pages(&mut pages);
        assert_eq!(pages[0], PathBuf::from("/t/page-1.png"));
        assert_eq!(pages[1], PathBuf::from("/t/page-2.png"));
        assert_eq!(pages[2], PathBuf::from("/t/page-10.png"));
    }

    #[test]
    fn test_rendered_page_number_zero_padded() {
        assert_eq!(rendered_page_number(Path::new("page-007.png")), Some(7));
        assert_eq!(rendered_page_number(Path::new("cover.png")), None);
    }

    #[tokio::test]
    async fn test_ocr_pdf_into_appends_marked_pages() {
        let engine = Arc::new(NamingOcr {
            fail_on: None,
            calls: AtomicUsize::new(0),
        });
        let svc = service(engine.clone(), 2, DEFAULT_OCR_TIMEOUT);
        let mut content = ExtractedContent::default();

        let pages = svc
            .ocr_pdf_into(Path::new("scan.pdf"), &mut content)
            .await
            .unwrap();

        assert_eq!(pages, 2);
        assert_eq!(
            content.text,
            "\n[OCR Page 1]\ntext of page-1\n[OCR Page 2]\ntext of page-2"
        );
        assert!(content.ocr_applied);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ocr_pdf_into_keeps_partial_text_on_failure() {
        let engine = Arc::new(NamingOcr {
            fail_on: Some("page-2".to_string()),
            calls: AtomicUsize::new(0),
        });
        let svc = service(engine, 3, DEFAULT_OCR_TIMEOUT);
        let mut content = ExtractedContent::default();

        let err = svc
            .ocr_pdf_into(Path::new("scan.pdf"), &mut content)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Ocr(_)));
        assert_eq!(content.text, "\n[OCR Page 1]\ntext of page-1");
        assert_eq!(content.pages.len(), 1);
    }

    #[tokio::test]
    async fn test_ocr_pdf_into_rejects_empty_render() {
        let engine = Arc::new(NamingOcr {
            fail_on: None,
            calls: AtomicUsize::new(0),
        });
        let svc = service(engine, 0, DEFAULT_OCR_TIMEOUT);
        let mut content = ExtractedContent::default();

        let err = svc
            .ocr_pdf_into(Path::new("scan.pdf"), &mut content)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Render(_)));
    }

    #[tokio::test]
    async fn test_recognize_image_times_out() {
        let svc = service(Arc::new(SlowOcr), 1, Duration::from_millis(20));
        let dir = tempdir().unwrap();
        let image = dir.path().join("a.png");

        let err = svc.recognize_image(&image).await.unwrap_err();
        assert!(matches!(err, ExtractError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_tesseract_binary_is_an_error() {
        let settings = OcrSettings {
            tesseract_bin: "docqa-no-such-tesseract".to_string(),
            ..OcrSettings::default()
        };
        let ocr = TesseractOcr::new(&settings);
        let err = ocr.recognize_image(Path::new("x.png")).await.unwrap_err();
        assert!(matches!(err, ExtractError::Failed(_)));
    }
}
