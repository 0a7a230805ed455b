//! # docqa-embed
//!
//! Deterministic text embeddings for docqa.
//!
//! Every embedder here maps a text to a fixed-length vector and returns the
//! same vector for the same text for the lifetime of the process. Empty text
//! is accepted.
//!
//! ## Cargo Features
//!
//! - `candle` (default): Enables [`CandleEmbedder`] and the Candle ML stack
//! - Without `candle`: Only [`HashEmbedder`] is available
//!
//! ## Model Details
//!
//! | Property | Value |
//! |----------|-------|
//! | Model | `sentence-transformers/all-MiniLM-L6-v2` |
//! | Dimension | 384 |
//! | Max tokens | 256 |
//! | Pooling | mean, L2-normalised |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docqa_embed::{CandleEmbedder, EmbedderPool, EmbeddingCache};
//! use docqa_core::{Embedder, EmbeddingConfig};
//! use std::sync::Arc;
//!
//! let embedder = CandleEmbedder::new(models_dir);
//! embedder.init().await?;  // Downloads model on first run
//!
//! let cached = Arc::new(EmbeddingCache::new(Arc::new(embedder)));
//! let pool = EmbedderPool::new(cached, 4);
//!
//! let output = pool.embed_query("What is the refund policy?", &EmbeddingConfig::default()).await?;
//! assert_eq!(output.embedding.len(), 384);
//! ```
//!
//! ## Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CandleEmbedder`] | BERT sentence encoder (requires `candle` feature) |
//! | [`HashEmbedder`] | Offline feature-hashing encoder |
//! | [`EmbeddingCache`] | LRU cache keyed by content hash |
//! | [`EmbedderPool`] | Concurrency limit and per-call timeout |

#[cfg(feature = "candle")]
pub mod candle;

#[cfg(feature = "candle")]
pub use candle::CandleEmbedder;

pub mod cache;
pub mod hash;
pub mod pool;

pub use cache::{CacheStats, EmbeddingCache};
pub use hash::HashEmbedder;
pub use pool::EmbedderPool;
