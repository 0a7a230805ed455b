//! # docqa CLI
//!
//! Upload documents into a local semantic index and ask questions against it.
//!
//! Text is pulled from PDFs (with an OCR fallback for scanned pages), images
//! (OCR) and plain text files, embedded into a single vector per document,
//! and stored in a persistent collection. Questions return the closest
//! documents with their distance.
//!
//! ## Commands
//!
//! - `docqa upload <FILE>` - Extract, embed and store a document
//! - `docqa ask <QUESTION>` - Rank stored documents against a question
//! - `docqa status` - Show collection statistics
//! - `docqa config show|init|path` - Inspect configuration
//!
//! ## Examples
//!
//! ```bash
//! # Store a document
//! docqa upload ~/Documents/policy.pdf
//!
//! # Ask a question
//! docqa ask "What is the refund window?" -k 3
//!
//! # Get JSON output
//! docqa --format json ask "refund"
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docqa_core::{
    DistanceMetric, DocumentKind, Embedder, UploadResponse, UploadStatus, VectorStore,
};
#[cfg(feature = "candle")]
use docqa_embed::CandleEmbedder;
use docqa_embed::{EmbedderPool, EmbeddingCache, HashEmbedder};
use docqa_extract::{DocumentExtractor, ExtractorRegistry, OcrService};
use docqa_index::{sanitize_filename, IngestConfig, IngestService};
use docqa_query::QueryExecutor;
#[cfg(feature = "lancedb")]
use docqa_store::LanceStore;
#[cfg(not(feature = "lancedb"))]
use docqa_store::MemoryStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

mod config;

use config::{Config, EmbeddingBackend};

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Upload documents and ask questions against a local semantic index")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/docqa/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Collection name (overrides config)
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Data directory (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, embed and store a document
    Upload {
        /// File to upload
        file: PathBuf,

        /// Document identifier (default: the file name)
        #[arg(long)]
        id: Option<String>,

        /// Declared MIME type (default: inferred from the extension)
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Ask a question
    Ask {
        /// Question text
        question: String,

        /// Maximum answers
        #[arg(short)]
        k: Option<usize>,
    },

    /// Show collection status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for status.
#[derive(Serialize)]
struct StatusOutput {
    collection: String,
    data_dir: String,
    total_entries: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<usize>,
    metric: DistanceMetric,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
}

/// Resolved settings shared by the commands.
struct App {
    config: Config,
    data_dir: PathBuf,
}

impl App {
    fn new(mut config: Config, cli: &Cli) -> Result<Self> {
        if let Some(collection) = &cli.collection {
            config.storage.collection.clone_from(collection);
        }
        if let Some(dir) = &cli.data_dir {
            config.storage.data_dir = Some(dir.clone());
        }
        let data_dir = config
            .data_dir()
            .context("Failed to determine data directory")?;
        Ok(Self { config, data_dir })
    }

    /// Open the vector store for the configured collection.
    async fn store(&self) -> Result<Arc<dyn VectorStore>> {
        let storage = &self.config.storage;

        #[cfg(feature = "lancedb")]
        let store = LanceStore::new(self.data_dir.join("index"), storage.collection.clone())
            .with_metric(storage.metric);

        #[cfg(not(feature = "lancedb"))]
        let store = {
            warn!("Built without LanceDB; the index lives only for this process");
            MemoryStore::with_metric(storage.metric)
        };

        store.init().await.context("Failed to initialize store")?;
        Ok(Arc::new(store))
    }

    /// Build the embedder stack: backend, cache, pool.
    async fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let settings = &self.config.embedding;

        let backend: Arc<dyn Embedder> = match settings.backend {
            EmbeddingBackend::Hash => Arc::new(HashEmbedder::with_dimension(settings.hash_dimension)),
            #[cfg(feature = "candle")]
            EmbeddingBackend::Candle => {
                let embedder = CandleEmbedder::new(self.data_dir.join("models"));
                info!("Initializing embedder (this may download the model on first run)...");
                embedder
                    .init()
                    .await
                    .context("Failed to initialize embedder")?;
                Arc::new(embedder)
            }
            #[cfg(not(feature = "candle"))]
            EmbeddingBackend::Candle => {
                anyhow::bail!(
                    "embedding backend 'candle' is not compiled in; set embedding.backend = \"hash\""
                )
            }
        };

        let cached = Arc::new(EmbeddingCache::with_capacity(backend, settings.cache_size));
        Ok(Arc::new(EmbedderPool::with_timeout(
            cached,
            settings.max_concurrent,
            Duration::from_secs(settings.timeout_secs),
        )))
    }

    fn extractor(&self) -> DocumentExtractor {
        let extraction = &self.config.extraction;
        let ocr = extraction
            .ocr_enabled
            .then(|| Arc::new(OcrService::external(&extraction.ocr_settings())));
        if ocr.is_none() {
            info!("OCR disabled; images and scanned PDFs will yield no text");
        }
        DocumentExtractor::new(ExtractorRegistry::standard(ocr))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.clone()).context("Failed to load config")?;

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.logging.level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let ctx = App::new(config, &cli)?;

    match &cli.command {
        Commands::Upload {
            file,
            id,
            content_type,
        } => {
            let response = upload(&ctx, file, id.as_deref(), content_type.as_deref()).await?;

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
                OutputFormat::Text => match &response.error {
                    None => println!("Uploaded '{}'", response.identifier),
                    Some(error) => println!("Failed '{}': {}", response.identifier, error),
                },
            }

            if response.status == UploadStatus::Failed {
                anyhow::bail!("upload of '{}' failed", response.identifier);
            }
        }

        Commands::Ask { question, k } => {
            let store = ctx.store().await?;
            let embedder = ctx.embedder().await?;
            let executor = QueryExecutor::new(
                store,
                embedder,
                ctx.config.query.default_limit,
                ctx.config.query.max_limit,
            );

            let answers = executor
                .answer(question, *k)
                .await
                .context("Query execution failed")?;

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&answers)?),
                OutputFormat::Text => {
                    println!("Question: {question}\n");
                    if answers.answers.is_empty() {
                        println!("No documents found.");
                    } else {
                        for (i, answer) in answers.answers.iter().enumerate() {
                            println!(
                                "{}. {} (distance: {:.4})",
                                i + 1,
                                answer.document,
                                answer.distance
                            );
                            println!("   {}", truncate(&answer.extracted_answer, 200));
                            println!();
                        }
                    }
                }
            }
        }

        Commands::Status => {
            let store = ctx.store().await?;
            let stats = store.stats().await.context("Failed to read store stats")?;

            match cli.format {
                OutputFormat::Json => {
                    let output = StatusOutput {
                        collection: ctx.config.storage.collection.clone(),
                        data_dir: ctx.data_dir.to_string_lossy().to_string(),
                        total_entries: stats.total_entries,
                        dimension: stats.dimension,
                        metric: stats.metric,
                        last_updated: stats.last_updated.map(|t| t.to_rfc3339()),
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!("Collection '{}'", ctx.config.storage.collection);
                    println!("  Data:      {}", ctx.data_dir.display());
                    println!("  Documents: {}", stats.total_entries);
                    if let Some(dimension) = stats.dimension {
                        println!("  Dimension: {dimension}");
                    }
                    println!("  Metric:    {}", stats.metric.as_str());
                    if let Some(last) = stats.last_updated {
                        println!("  Updated:   {}", last.format("%Y-%m-%d %H:%M:%S"));
                    }
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&ctx.config)
                            .context("Failed to serialize config")?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&ctx.config)
                            .context("Failed to serialize config")?
                    );
                }
            },
            ConfigAction::Init => {
                print!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                if let Some(path) = Config::config_path() {
                    println!("{}", path.display());
                } else {
                    println!("Could not determine config directory");
                }
            }
        },
    }

    Ok(())
}

/// Read `file` and push it through the ingestion service.
async fn upload(
    ctx: &App,
    file: &Path,
    id: Option<&str>,
    content_type: Option<&str>,
) -> Result<UploadResponse> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let filename = upload_name(file, id)?;

    // An identifier without an extension would lose the format hint.
    let declared = content_type.map(str::to_string).or_else(|| {
        DocumentKind::from_extension(file).map(|kind| kind.default_mime(file).to_string())
    });

    let store = ctx.store().await?;
    let embedder = ctx.embedder().await?;
    let service = IngestService::new(
        Arc::new(ctx.extractor()),
        embedder,
        store,
        IngestConfig::new(ctx.data_dir.join("uploads")),
    );

    let response = service
        .upload(&bytes, &filename, declared.as_deref())
        .await;
    if let Some(error) = &response.error {
        warn!("Upload of '{}' failed: {}", response.identifier, error);
    }
    Ok(response)
}

/// Identifier for an upload: `--id` verbatim, else the file's name. An
/// explicit id must already be a plain file name; it is never rewritten.
fn upload_name(file: &Path, id: Option<&str>) -> Result<String> {
    match id {
        Some(id) => {
            if sanitize_filename(id).as_deref() != Some(id) {
                bail!("Invalid document id '{id}': use a plain name without path separators");
            }
            Ok(id.to_string())
        }
        None => file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .with_context(|| format!("{} has no file name", file.display())),
    }
}

/// Truncate a string to max chars, adding ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ").replace('\r', "");
    if s.chars().count() <= max_len {
        s
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
