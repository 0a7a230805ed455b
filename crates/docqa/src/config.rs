//! Configuration handling for docqa.
//!
//! Loaded from `<config_dir>/config.toml`; every field has a default, so a
//! missing file or a partial one is fine.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use docqa_core::DistanceMetric;
use docqa_extract::OcrSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Extraction configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how the index is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory; defaults to the platform data dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Collection (table) name
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Distance metric for queries
    #[serde(default)]
    pub metric: DistanceMetric,
}

fn default_collection() -> String {
    "documents".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            collection: default_collection(),
            metric: DistanceMetric::default(),
        }
    }
}

/// OCR fallback configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Run OCR on images and on PDFs without a text layer
    #[serde(default = "default_ocr_enabled")]
    pub ocr_enabled: bool,

    /// `tesseract` binary
    #[serde(default = "default_tesseract_bin")]
    pub tesseract_bin: String,

    /// `pdftoppm` binary
    #[serde(default = "default_pdftoppm_bin")]
    pub pdftoppm_bin: String,

    /// Tesseract language code
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,

    /// Rasterisation resolution for PDF pages
    #[serde(default = "default_ocr_dpi")]
    pub ocr_dpi: u32,

    /// Max concurrent OCR jobs
    #[serde(default = "default_ocr_max_concurrent")]
    pub ocr_max_concurrent: usize,

    /// Limit for each OCR command (seconds)
    #[serde(default = "default_ocr_timeout_secs")]
    pub ocr_timeout_secs: u64,
}

fn default_ocr_enabled() -> bool {
    true
}

fn default_tesseract_bin() -> String {
    "tesseract".to_string()
}

fn default_pdftoppm_bin() -> String {
    "pdftoppm".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_ocr_dpi() -> u32 {
    150
}

fn default_ocr_max_concurrent() -> usize {
    2
}

fn default_ocr_timeout_secs() -> u64 {
    120
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            ocr_enabled: default_ocr_enabled(),
            tesseract_bin: default_tesseract_bin(),
            pdftoppm_bin: default_pdftoppm_bin(),
            ocr_language: default_ocr_language(),
            ocr_dpi: default_ocr_dpi(),
            ocr_max_concurrent: default_ocr_max_concurrent(),
            ocr_timeout_secs: default_ocr_timeout_secs(),
        }
    }
}

impl ExtractionConfig {
    /// Settings for the external OCR tools.
    #[must_use]
    pub fn ocr_settings(&self) -> OcrSettings {
        OcrSettings {
            tesseract_bin: self.tesseract_bin.clone(),
            pdftoppm_bin: self.pdftoppm_bin.clone(),
            language: self.ocr_language.clone(),
            dpi: self.ocr_dpi,
            max_concurrent: self.ocr_max_concurrent,
            timeout: Duration::from_secs(self.ocr_timeout_secs),
        }
    }
}

/// Which encoder turns text into vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// all-MiniLM-L6-v2 through Candle
    #[default]
    Candle,
    /// Offline feature hashing
    Hash,
}

/// Embedding-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Encoder backend
    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// Vector length for the hash backend
    #[serde(default = "default_hash_dimension")]
    pub hash_dimension: usize,

    /// Max concurrent embedding jobs
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Limit for one embedding call (seconds)
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,

    /// Cached embeddings kept in memory
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

fn default_hash_dimension() -> usize {
    384
}

fn default_max_concurrent() -> usize {
    4
}

fn default_embed_timeout_secs() -> u64 {
    60
}

fn default_cache_size() -> usize {
    10_000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            hash_dimension: default_hash_dimension(),
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_embed_timeout_secs(),
            cache_size: default_cache_size(),
        }
    }
}

/// Query-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default result limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Maximum result limit
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

fn default_limit() -> usize {
    5
}

fn default_max_limit() -> usize {
    100
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`. An
    /// explicit path must exist; a missing default file yields defaults.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::read(&path),
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Parse TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Data directory: the configured one, else `DOCQA_DATA_DIR`, else the
    /// platform default.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.storage.data_dir.clone().or_else(data_dir)
    }

    /// Sample configuration file with every option at its default.
    pub fn sample_toml() -> &'static str {
        r#"# docqa configuration

[storage]
# data_dir = "/var/lib/docqa"
collection = "documents"
# l2 (squared Euclidean), cosine or dot
metric = "l2"

[extraction]
ocr_enabled = true
tesseract_bin = "tesseract"
pdftoppm_bin = "pdftoppm"
ocr_language = "eng"
ocr_dpi = 150
ocr_max_concurrent = 2
ocr_timeout_secs = 120

[embedding]
# candle (all-MiniLM-L6-v2) or hash (offline, no model download)
backend = "candle"
hash_dimension = 384
max_concurrent = 4
timeout_secs = 60
cache_size = 10000

[query]
default_limit = 5
max_limit = 100

[logging]
level = "info"
"#
    }
}

/// Get the data directory for docqa.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCQA_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "docqa").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the config directory for docqa.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCQA_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "docqa").map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.collection, "documents");
        assert_eq!(config.storage.metric, DistanceMetric::L2);
        assert!(config.extraction.ocr_enabled);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Candle);
        assert_eq!(config.query.default_limit, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_sample_matches_defaults() {
        let parsed = Config::parse(Config::sample_toml()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed = Config::parse(
            r#"
            [storage]
            collection = "contracts"
            metric = "cosine"

            [embedding]
            backend = "hash"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.storage.collection, "contracts");
        assert_eq!(parsed.storage.metric, DistanceMetric::Cosine);
        assert_eq!(parsed.embedding.backend, EmbeddingBackend::Hash);
        assert_eq!(parsed.embedding.hash_dimension, 384);
        assert_eq!(parsed.query, QueryConfig::default());
    }

    #[test]
    fn test_invalid_value_rejected() {
        assert!(Config::parse("[storage]\nmetric = \"manhattan\"").is_err());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[query]\ndefault_limit = 3\n").unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.query.default_limit, 3);
        assert_eq!(config.query.max_limit, 100);
    }

    #[test]
    fn test_load_from_missing_explicit_path_fails() {
        let dir = tempdir().unwrap();
        assert!(Config::load_from(Some(dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_configured_data_dir_wins() {
        let mut config = Config::default();
        config.storage.data_dir = Some(PathBuf::from("/srv/docqa"));
        assert_eq!(config.data_dir(), Some(PathBuf::from("/srv/docqa")));
    }

    #[test]
    fn test_ocr_settings_conversion() {
        let settings = ExtractionConfig::default().ocr_settings();
        assert_eq!(settings.language, "eng");
        assert_eq!(settings.dpi, 150);
        assert_eq!(settings.timeout, Duration::from_secs(120));
    }
}
