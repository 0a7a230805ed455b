//! Plain text extractor.
//!
//! Reads the file as UTF-8. Invalid UTF-8 yields empty text with the decode
//! error kept as the extraction note; it is never an error.

use async_trait::async_trait;
use docqa_core::{ContentExtractor, ExtractError, ExtractedContent};
use std::path::Path;
use tokio::fs;
use tracing::warn;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "text", "md", "markdown", "rst", "csv", "tsv", "log", "json", "xml", "html", "htm",
    "yaml", "yml", "toml", "ini", "cfg", "conf", "rs", "py", "js", "ts", "go", "java", "c", "h",
    "cpp", "sh", "sql",
];

/// Extractor for plain text files.
pub struct TextExtractor;

impl TextExtractor {
    /// Create a new text extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for TextExtractor {
    fn supported_types(&self) -> &[&str] {
        &[
            "text/plain",
            "text/markdown",
            "text/csv",
            "text/html",
            "text/xml",
            "application/json",
            "application/xml",
            "application/x-yaml",
        ]
    }

    fn can_extract(&self, path: &Path, mime_type: &str) -> bool {
        mime_type.starts_with("text/")
            || self.supported_types().contains(&mime_type)
            || self.can_extract_by_extension(path)
    }

    fn can_extract_by_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedContent, ExtractError> {
        let bytes = fs::read(path).await?;

        match String::from_utf8(bytes) {
            Ok(text) => Ok(ExtractedContent::plain(text)),
            Err(e) => {
                warn!("{:?} is not valid UTF-8: {}", path, e.utf8_error());
                Ok(ExtractedContent {
                    error_note: Some(format!("file is not valid UTF-8: {}", e.utf8_error())),
                    ..ExtractedContent::default()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_supported_types_includes_common_types() {
        let extractor = TextExtractor::new();
        let types = extractor.supported_types();

        assert!(types.contains(&"text/plain"));
        assert!(types.contains(&"text/markdown"));
        assert!(types.contains(&"application/json"));
    }

    #[test]
    fn test_can_extract_any_text_mime() {
        let extractor = TextExtractor::new();
        assert!(extractor.can_extract(Path::new("upload"), "text/x-weird"));
        assert!(!extractor.can_extract(Path::new("upload"), "image/png"));
    }

    #[test]
    fn test_can_extract_by_extension() {
        let extractor = TextExtractor::new();
        assert!(extractor.can_extract_by_extension(Path::new("/test/file.txt")));
        assert!(extractor.can_extract_by_extension(Path::new("/test/README.md")));
        assert!(extractor.can_extract_by_extension(Path::new("/test/FILE.TXT")));
        assert!(!extractor.can_extract_by_extension(Path::new("/test/image.png")));
        assert!(!extractor.can_extract_by_extension(Path::new("/test/no_extension")));
    }

    #[tokio::test]
    async fn test_extract_simple_text() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        std::fs::write(&file_path, "Hello, world!").unwrap();

        let content = TextExtractor::new().extract(&file_path).await.unwrap();

        assert_eq!(content.text, "Hello, world!");
        assert!(content.pages.is_empty());
        assert!(content.error_note.is_none());
    }

    #[tokio::test]
    async fn test_extract_handles_empty_file() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("empty.txt");
        std::fs::write(&file_path, "").unwrap();

        let content = TextExtractor::new().extract(&file_path).await.unwrap();

        assert_eq!(content.text, "");
        assert!(content.error_note.is_none());
    }

    #[tokio::test]
    async fn test_extract_handles_unicode() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("unicode.txt");
        let text = "Hello 世界! Привет мир!";
        std::fs::write(&file_path, text).unwrap();

        let content = TextExtractor::new().extract(&file_path).await.unwrap();

        assert_eq!(content.text, text);
    }

    #[tokio::test]
    async fn test_invalid_utf8_yields_empty_text_with_note() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("latin1.txt");
        std::fs::write(&file_path, [0x63, 0x61, 0x66, 0xE9, 0xFF]).unwrap();

        let content = TextExtractor::new().extract(&file_path).await.unwrap();

        assert_eq!(content.text, "");
        let note = content.error_note.unwrap();
        assert!(note.contains("not valid UTF-8"));
    }

    #[tokio::test]
    async fn test_extract_nonexistent_file_fails() {
        let result = TextExtractor::new()
            .extract(Path::new("/nonexistent/file.txt"))
            .await;

        assert!(matches!(result, Err(ExtractError::Io(_))));
    }
}
