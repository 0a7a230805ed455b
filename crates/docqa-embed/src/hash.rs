//! Feature-hashing embedder.
//!
//! Each lower-cased alphanumeric token is hashed with blake3 into one of
//! `dimension` buckets with a hash-derived sign, and the bucket counts are
//! L2-normalised. Texts sharing words land close together; the result
//! depends only on the text, so it is stable across processes and
//! platforms. Needs no model download.

use async_trait::async_trait;
use docqa_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};

/// Default dimension, matching the Candle model.
pub const DEFAULT_DIMENSION: usize = 384;

/// Deterministic offline embedder based on the hashing trick.
///
/// ```rust
/// use docqa_embed::HashEmbedder;
/// use docqa_core::{Embedder, EmbeddingConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let embedder = HashEmbedder::new();
/// let config = EmbeddingConfig::default();
/// let outputs = embedder.embed_text(&["Hello", ""], &config).await?;
///
/// assert_eq!(outputs[0].embedding.len(), 384);
/// assert!(outputs[1].embedding.iter().all(|&v| v == 0.0));
/// # Ok(())
/// # }
/// ```
pub struct HashEmbedder {
    dimension: usize,
    name: String,
}

impl HashEmbedder {
    /// Create a hashing embedder with the default dimension (384).
    #[must_use]
    pub fn new() -> Self {
        Self::with_dimension(DEFAULT_DIMENSION)
    }

    /// Create a hashing embedder with a custom dimension (at least 1).
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            name: format!("hash-{dimension}"),
        }
    }

    fn encode(&self, text: &str, normalize: bool) -> EmbeddingOutput {
        let mut embedding = vec![0.0f32; self.dimension];
        let mut token_count = 0;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            token_count += 1;
            let digest = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = digest.as_bytes();
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(word) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        if normalize {
            let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut embedding {
                    *v /= norm;
                }
            }
        }

        EmbeddingOutput {
            embedding,
            token_count,
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        usize::MAX
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        Ok(texts
            .iter()
            .map(|text| self.encode(text, config.normalize))
            .collect())
    }
}
