//! Ingestion pipeline for docqa.
//!
//! Each document goes through extraction → embedding → upsert, keyed by a
//! caller-chosen identifier.
//!
//! # Components
//!
//! - [`IngestService`]: Coordinates the pipeline for one document at a time
//! - [`IngestConfig`]: Embedding options and the uploads directory
//! - [`IngestUpdate`]: Events emitted during ingestion
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_index::{IngestConfig, IngestService};
//!
//! let service = IngestService::new(extractor, embedder, store, IngestConfig::new(uploads_dir));
//!
//! // Subscribe to updates
//! let mut updates = service.subscribe();
//!
//! let response = service.upload(&bytes, "report.pdf", Some("application/pdf")).await;
//! println!("{}", serde_json::to_string(&response)?);
//! ```

pub mod ingest;

pub use ingest::{IngestConfig, IngestReceipt, IngestService, IngestUpdate, sanitize_filename};
