//! Ingestion service: extract, embed, upsert.

use chrono::Utc;
use docqa_core::{
    DocumentMetadata, EmbedError, Embedder, EmbeddingConfig, Error, Extraction,
    ExtractionMetadata, IndexEntry, IngestError, IngestStats, UploadResponse, UpsertOutcome,
    VectorStore,
};
use docqa_extract::DocumentExtractor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};

/// Ingestion events.
#[derive(Debug, Clone)]
pub enum IngestUpdate {
    Started {
        id: String,
    },
    Indexed {
        id: String,
        outcome: UpsertOutcome,
        char_length: usize,
    },
    Failed {
        id: String,
        error: String,
    },
}

/// Configuration for the ingestion service.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Embedding configuration
    pub embed_config: EmbeddingConfig,
    /// Where uploaded bytes are written before extraction
    pub uploads_dir: PathBuf,
}

impl IngestConfig {
    #[must_use]
    pub fn new(uploads_dir: PathBuf) -> Self {
        Self {
            embed_config: EmbeddingConfig::default(),
            uploads_dir,
        }
    }
}

/// What a successful ingestion wrote.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    /// Document identifier
    pub id: String,
    /// Whether the entry was new
    pub outcome: UpsertOutcome,
    /// Extraction metadata of the stored text
    pub extraction: ExtractionMetadata,
    /// Recovered extraction failure, if any
    pub extraction_error: Option<String>,
}

/// Ingestion service.
pub struct IngestService {
    extractor: Arc<DocumentExtractor>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: IngestConfig,
    /// Running counters
    stats: RwLock<IngestStats>,
    /// Update broadcast
    update_tx: broadcast::Sender<IngestUpdate>,
}

impl IngestService {
    /// Create a new ingestion service.
    pub fn new(
        extractor: Arc<DocumentExtractor>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: IngestConfig,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(256);

        Self {
            extractor,
            embedder,
            store,
            config,
            stats: RwLock::new(IngestStats::default()),
            update_tx,
        }
    }

    /// Subscribe to ingestion updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IngestUpdate> {
        self.update_tx.subscribe()
    }

    /// Snapshot of the running counters.
    pub async fn stats(&self) -> IngestStats {
        self.stats.read().await.clone()
    }

    /// Directory uploads are written to.
    pub fn uploads_dir(&self) -> &Path {
        &self.config.uploads_dir
    }

    /// Extract `path`, embed the text and upsert it under `id`.
    ///
    /// Extraction problems never fail the call; the stored text carries the
    /// error note instead. Empty text is still embedded and stored.
    pub async fn ingest(
        &self,
        path: &Path,
        declared_type: Option<&str>,
        id: &str,
    ) -> Result<IngestReceipt, IngestError> {
        let _ = self.update_tx.send(IngestUpdate::Started { id: id.to_string() });
        info!("Ingesting {:?} as '{}'", path, id);

        let extraction = self.extractor.extract(path, declared_type).await;
        if let Some(reason) = &extraction.error {
            warn!("Extraction of '{}' recovered from: {}", id, reason);
        }

        match self.index(id, &extraction).await {
            Ok(outcome) => {
                info!(
                    "Indexed '{}' ({} chars, {:?})",
                    id, extraction.metadata.length, outcome
                );
                let _ = self.update_tx.send(IngestUpdate::Indexed {
                    id: id.to_string(),
                    outcome,
                    char_length: extraction.metadata.length,
                });

                let mut s = self.stats.write().await;
                s.ingested += 1;
                if extraction.metadata.ocr_applied {
                    s.ocr_documents += 1;
                }
                if extraction.error.is_some() {
                    s.extraction_warnings += 1;
                }
                s.last_ingest = Some(Utc::now());

                Ok(IngestReceipt {
                    id: id.to_string(),
                    outcome,
                    extraction: extraction.metadata,
                    extraction_error: extraction.error,
                })
            }
            Err(e) => {
                let err = IngestError::new(id, e);
                error!("{}", err);
                let _ = self.update_tx.send(IngestUpdate::Failed {
                    id: id.to_string(),
                    error: err.reason(),
                });
                self.stats.write().await.failed += 1;
                Err(err)
            }
        }
    }

    /// Save uploaded bytes under their sanitised file name and ingest them
    /// with that name as the identifier.
    ///
    /// Each upload is staged in its own temporary file and extracted from
    /// there, then renamed over the final name. Concurrent uploads of the
    /// same name never read each other's bytes.
    pub async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        declared_type: Option<&str>,
    ) -> UploadResponse {
        let Some(name) = sanitize_filename(filename) else {
            warn!("Rejected upload with file name {:?}", filename);
            return UploadResponse::failed(filename, format!("invalid file name '{filename}'"));
        };

        let staged = match self.stage(&name, bytes).await {
            Ok(staged) => staged,
            Err(e) => {
                error!("Failed to save upload '{}': {}", name, e);
                return UploadResponse::failed(name, e.to_string());
            }
        };
        debug!("Staged {} bytes at {:?}", bytes.len(), staged.path());

        let result = self.ingest(staged.path(), declared_type, &name).await;

        let path = self.config.uploads_dir.join(&name);
        if let Err(e) = staged.persist(&path) {
            error!("Failed to save upload {:?}: {}", path, e.error);
            return UploadResponse::failed(name, e.error.to_string());
        }

        match result {
            Ok(_) => UploadResponse::uploaded(name),
            Err(e) => UploadResponse::failed(name, e.reason()),
        }
    }

    /// Write `bytes` to a fresh temporary file in the uploads directory. The
    /// file name ends with `name` so extension-based detection still works.
    async fn stage(&self, name: &str, bytes: &[u8]) -> Result<NamedTempFile, Error> {
        tokio::fs::create_dir_all(&self.config.uploads_dir).await?;
        let staged = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(&format!("-{name}"))
            .tempfile_in(&self.config.uploads_dir)?;
        tokio::fs::write(staged.path(), bytes).await?;
        Ok(staged)
    }

    async fn index(&self, id: &str, extraction: &Extraction) -> Result<UpsertOutcome, Error> {
        let mut outputs = self
            .embedder
            .embed_text(&[extraction.text.as_str()], &self.config.embed_config)
            .await?;
        let output = outputs
            .pop()
            .ok_or_else(|| EmbedError::Inference("embedder returned no vector".to_string()))?;

        let entry = IndexEntry {
            id: id.to_string(),
            text: extraction.text.clone(),
            embedding: output.embedding,
            metadata: DocumentMetadata {
                char_length: extraction.metadata.length,
                pages: extraction.metadata.pages.clone(),
                kind: extraction.metadata.kind,
                mime_type: extraction.metadata.mime_type.clone(),
                ocr_applied: extraction.metadata.ocr_applied,
                embedding_model: Some(self.embedder.model_name().to_string()),
                indexed_at: Some(Utc::now()),
            },
        };

        Ok(self.store.upsert(&entry).await?)
    }
}

/// Final path component of a client-supplied file name. Both `/` and `\`
/// count as separators; `.`, `..` and empty names are rejected.
#[must_use]
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match name {
        "" | "." | ".." => None,
        name if name.contains('\0') => None,
        name => Some(name.to_string()),
    }
}
