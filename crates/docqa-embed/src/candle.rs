//! Sentence encoder using Candle.
//!
//! Runs `sentence-transformers/all-MiniLM-L6-v2`:
//! - 384 dimensions
//! - 256 max tokens (longer inputs are truncated)
//! - BERT architecture, mean pooling, L2 normalisation

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use docqa_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use hf_hub::api::tokio::ApiBuilder;
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Model identifier on HuggingFace Hub.
pub const MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Embedding dimension for all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// Maximum sequence length.
const MAX_TOKENS: usize = 256;

fn inference<T>(result: candle_core::Result<T>, step: &str) -> Result<T, EmbedError> {
    result.map_err(|e| EmbedError::Inference(format!("{step} failed: {e}")))
}

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
}

/// BERT sentence encoder running locally through Candle.
pub struct CandleEmbedder {
    /// Device to run inference on (CPU or CUDA)
    device: Device,
    /// Hugging Face cache directory for model files
    cache_dir: PathBuf,
    /// Model and tokenizer, loaded on first use
    loaded: OnceCell<Arc<LoadedModel>>,
}

impl CandleEmbedder {
    /// Create a new `CandleEmbedder` caching model files under `cache_dir`.
    pub fn new(cache_dir: PathBuf) -> Self {
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
        info!("CandleEmbedder using device: {:?}", device);
        Self::with_device(cache_dir, device)
    }

    /// Create with specific device.
    pub fn with_device(cache_dir: PathBuf, device: Device) -> Self {
        Self {
            device,
            cache_dir,
            loaded: OnceCell::new(),
        }
    }

    /// Download (if needed) and load the model. Safe to call repeatedly.
    pub async fn init(&self) -> Result<(), EmbedError> {
        self.loaded().await.map(|_| ())
    }

    async fn loaded(&self) -> Result<Arc<LoadedModel>, EmbedError> {
        self.loaded
            .get_or_try_init(|| async { self.load().await.map(Arc::new) })
            .await
            .map(Arc::clone)
    }

    async fn load(&self) -> Result<LoadedModel, EmbedError> {
        info!("Loading {} (cache: {:?})", MODEL_ID, self.cache_dir);

        let api = ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .build()
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to create HF API: {e}")))?;
        let repo = api.repo(Repo::new(MODEL_ID.to_string(), RepoType::Model));

        let mut files = Vec::with_capacity(3);
        for name in ["tokenizer.json", "config.json", "model.safetensors"] {
            debug!("Fetching {}", name);
            let path = repo
                .get(name)
                .await
                .map_err(|e| EmbedError::ModelLoad(format!("Failed to download {name}: {e}")))?;
            files.push(path);
        }
        let [tokenizer_path, config_path, weights_path] = <[PathBuf; 3]>::try_from(files)
            .map_err(|_| EmbedError::ModelLoad("incomplete model download".to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to configure truncation: {e}")))?;

        let config_str = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to read config: {e}")))?;
        let config: Config = serde_json::from_str(&config_str)
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to parse config: {e}")))?;

        // SAFETY: the weights file is read-only and comes from the HF cache.
        #[allow(unsafe_code)]
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &self.device)
                .map_err(|e| EmbedError::ModelLoad(format!("Failed to load weights: {e}")))?
        };
        let model = BertModel::load(vb, &config)
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to create BERT model: {e}")))?;

        info!("{} loaded", MODEL_ID);
        Ok(LoadedModel { model, tokenizer })
    }

    /// Mean of the token embeddings, ignoring padding.
    fn mean_pooling(token_embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor, EmbedError> {
        let mask = inference(attention_mask.to_dtype(DType::F32), "mask dtype")?;
        let mask = inference(mask.unsqueeze(2), "unsqueeze")?;
        let summed = inference(token_embeddings.broadcast_mul(&mask), "mask mul")?;
        let summed = inference(summed.sum(1), "sum")?;
        let counts = inference(mask.sum(1), "mask sum")?;
        let counts = inference(counts.clamp(1e-9, f64::MAX), "clamp")?;
        inference(summed.broadcast_div(&counts), "mean")
    }

    fn l2_normalize(embeddings: &Tensor) -> Result<Tensor, EmbedError> {
        let norm = inference(embeddings.sqr(), "sqr")?;
        let norm = inference(norm.sum_keepdim(1), "sum_keepdim")?;
        let norm = inference(norm.sqrt(), "sqrt")?;
        let norm = inference(norm.clamp(1e-12, f64::MAX), "clamp")?;
        inference(embeddings.broadcast_div(&norm), "normalize")
    }

    /// Encode one batch of texts. Tokenisation and the forward pass run on
    /// the blocking pool so a caller's timeout can fire while they finish.
    async fn encode_batch(
        &self,
        texts: &[&str],
        normalize: bool,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let loaded = self.loaded().await?;
        let device = self.device.clone();
        let texts: Vec<String> = texts.iter().map(|t| (*t).to_string()).collect();

        tokio::task::spawn_blocking(move || encode_sync(&loaded, &device, texts, normalize))
            .await
            .map_err(|e| EmbedError::Inference(format!("encoder task failed: {e}")))?
    }
}

fn encode_sync(
    loaded: &LoadedModel,
    device: &Device,
    texts: Vec<String>,
    normalize: bool,
) -> Result<Vec<EmbeddingOutput>, EmbedError> {
    let LoadedModel { model, tokenizer } = loaded;

    let encodings = tokenizer
        .encode_batch(texts, true)
        .map_err(|e| EmbedError::Inference(format!("Tokenization failed: {e}")))?;

    let width = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
    let batch = encodings.len();

    let mut ids = Vec::with_capacity(batch * width);
    let mut mask = Vec::with_capacity(batch * width);
    let mut token_counts = Vec::with_capacity(batch);
    for encoding in &encodings {
        let len = encoding.len();
        token_counts.push(len);
        ids.extend_from_slice(encoding.get_ids());
        ids.extend(std::iter::repeat(0u32).take(width - len));
        mask.extend(std::iter::repeat(1u32).take(len));
        mask.extend(std::iter::repeat(0u32).take(width - len));
    }

    let input_ids = inference(Tensor::from_vec(ids, (batch, width), device), "input_ids")?;
    let attention_mask =
        inference(Tensor::from_vec(mask, (batch, width), device), "attention_mask")?;
    let token_type_ids = inference(input_ids.zeros_like(), "token_type_ids")?;

    let output = inference(
        model.forward(&input_ids, &token_type_ids, Some(&attention_mask)),
        "forward",
    )?;

    let mut pooled = CandleEmbedder::mean_pooling(&output, &attention_mask)?;
    if normalize {
        pooled = CandleEmbedder::l2_normalize(&pooled)?;
    }

    let rows = inference(pooled.to_vec2::<f32>(), "to_vec2")?;
    Ok(rows
        .into_iter()
        .zip(token_counts)
        .map(|(embedding, token_count)| EmbeddingOutput {
            embedding,
            token_count,
        })
        .collect())
}

#[async_trait]
impl Embedder for CandleEmbedder {
    fn model_name(&self) -> &str {
        MODEL_ID
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn max_tokens(&self) -> usize {
        MAX_TOKENS
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding {} texts with batch_size {}",
            texts.len(),
            config.batch_size
        );

        let mut all_results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(config.batch_size.max(1)) {
            all_results.extend(self.encode_batch(chunk, config.normalize).await?);
        }

        Ok(all_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    #[ignore] // Requires model download
    async fn test_candle_embedder() {
        let cache_dir = tempdir().unwrap();
        let embedder = CandleEmbedder::new(cache_dir.path().to_path_buf());

        embedder.init().await.unwrap();

        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.model_name(), MODEL_ID);

        let config = EmbeddingConfig::default();
        let results = embedder
            .embed_text(&["Hello world", "", "Hello world"], &config)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.embedding.len() == 384));

        // same input, same vector
        assert_eq!(results[0].embedding, results[2].embedding);

        let norm: f32 = results[0].embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }
}
