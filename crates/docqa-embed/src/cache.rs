//! Embedding cache for avoiding redundant computations.
//!
//! Entries are keyed by the blake3 hash of the text (and the normalisation
//! flag). When the cache is full the least recently used tenth is evicted.
//! Encoders are deterministic, so a cached vector is always the one the
//! wrapped embedder would have produced.

use async_trait::async_trait;
use docqa_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Maximum number of entries in the cache.
const DEFAULT_CACHE_SIZE: usize = 10_000;

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of entries evicted
    pub evictions: u64,
}

struct CacheEntry {
    output: EmbeddingOutput,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<blake3::Hash, CacheEntry>,
    clock: u64,
    stats: CacheStats,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_if_full(&mut self, max_size: usize) {
        if self.entries.len() < max_size {
            return;
        }
        let evict_count = (max_size / 10).max(1);
        let mut by_age: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (*k, v.last_used))
            .collect();
        by_age.sort_by_key(|(_, used)| *used);
        for (key, _) in by_age.into_iter().take(evict_count) {
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }
}

/// Embedder wrapper that memoises results.
pub struct EmbeddingCache {
    embedder: Arc<dyn Embedder>,
    state: Mutex<CacheState>,
    max_size: usize,
}

impl EmbeddingCache {
    /// Create a new embedding cache with default size.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_capacity(embedder, DEFAULT_CACHE_SIZE)
    }

    /// Create a new embedding cache with specified capacity.
    pub fn with_capacity(embedder: Arc<dyn Embedder>, max_size: usize) -> Self {
        Self {
            embedder,
            state: Mutex::new(CacheState::default()),
            max_size: max_size.max(1),
        }
    }

    fn key(text: &str, normalize: bool) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[u8::from(normalize)]);
        hasher.update(text.as_bytes());
        hasher.finalize()
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats.clone()
    }

    /// Get cache size.
    pub async fn size(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Clear the cache.
    pub async fn clear(&self) {
        self.state.lock().await.entries.clear();
    }
}

#[async_trait]
impl Embedder for EmbeddingCache {
    fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    fn max_tokens(&self) -> usize {
        self.embedder.max_tokens()
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let keys: Vec<_> = texts
            .iter()
            .map(|text| Self::key(text, config.normalize))
            .collect();
        let mut results: Vec<Option<EmbeddingOutput>> = Vec::with_capacity(texts.len());
        let mut missing = Vec::new();

        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            for (i, key) in keys.iter().enumerate() {
                let now = state.tick();
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.last_used = now;
                    results.push(Some(entry.output.clone()));
                    state.stats.hits += 1;
                } else {
                    results.push(None);
                    missing.push(i);
                    state.stats.misses += 1;
                }
            }
        }

        if !missing.is_empty() {
            debug!("Cache miss for {} texts, embedding", missing.len());

            let batch: Vec<&str> = missing.iter().map(|&i| texts[i]).collect();
            let fresh = self.embedder.embed_text(&batch, config).await?;
            if fresh.len() != batch.len() {
                return Err(EmbedError::Inference(format!(
                    "embedder returned {} vectors for {} texts",
                    fresh.len(),
                    batch.len()
                )));
            }

            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            for (&i, output) in missing.iter().zip(fresh) {
                state.evict_if_full(self.max_size);
                let last_used = state.tick();
                state.entries.insert(
                    keys[i],
                    CacheEntry {
                        output: output.clone(),
                        last_used,
                    },
                );
                results[i] = Some(output);
            }
        }

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| EmbedError::Inference("missing cached embedding".to_string())))
            .collect()
    }
}
