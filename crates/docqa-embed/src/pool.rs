//! Embedder pool for concurrent embedding operations.
//!
//! Bounds the number of in-flight inference calls and the time each may
//! take. A call that exceeds the timeout fails with [`EmbedError::Timeout`];
//! the caller decides whether to retry.
//!
//! Each call runs on its own task, so the timeout fires even when the
//! underlying embedder blocks its thread.

use async_trait::async_trait;
use docqa_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::warn;

/// Default limit for a single embedding call.
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(60);

/// Aborts the embedding task when the waiting call is dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Pool of embedders with concurrency control.
pub struct EmbedderPool {
    embedder: Arc<dyn Embedder>,
    semaphore: Semaphore,
    max_concurrent: usize,
    timeout: Duration,
}

impl EmbedderPool {
    /// Create a new embedder pool with the default timeout.
    pub fn new(embedder: Arc<dyn Embedder>, max_concurrent: usize) -> Self {
        Self::with_timeout(embedder, max_concurrent, DEFAULT_EMBED_TIMEOUT)
    }

    /// Create a new embedder pool with an explicit per-call timeout.
    pub fn with_timeout(
        embedder: Arc<dyn Embedder>,
        max_concurrent: usize,
        timeout: Duration,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            embedder,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            timeout,
        }
    }

    /// Get the underlying embedder.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Get pool statistics.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get max concurrent operations.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `call` on a spawned task while holding a permit, bounded by the
    /// pool timeout. Waiting for the permit counts against the timeout.
    async fn bounded<T, F, Fut>(&self, call: F) -> Result<T, EmbedError>
    where
        F: FnOnce(Arc<dyn Embedder>) -> Fut + Send,
        Fut: Future<Output = Result<T, EmbedError>> + Send + 'static,
        T: Send + 'static,
    {
        let run = async {
            let _permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|e| EmbedError::Inference(format!("semaphore error: {e}")))?;

            let task = tokio::spawn(call(Arc::clone(&self.embedder)));
            let _abort = AbortOnDrop(task.abort_handle());
            task.await
                .map_err(|e| EmbedError::Inference(format!("embedding task failed: {e}")))?
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Embedding with {} timed out after {:?}",
                    self.embedder.model_name(),
                    self.timeout
                );
                Err(EmbedError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl Embedder for EmbedderPool {
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
        let texts: Vec<String> = texts.iter().map(|t| (*t).to_string()).collect();
        let config = config.clone();
        self.bounded(move |embedder| async move {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder.embed_text(&refs, &config).await
        })
        .await
    }

    async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        let query = query.to_string();
        let config = config.clone();
        self.bounded(move |embedder| async move { embedder.embed_query(&query, &config).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashEmbedder;

    const TEST_DIM: usize = 64;

    struct SlowEmbedder {
        delay: Duration,
    }

    #[async_trait]
    impl Embedder for SlowEmbedder {
        fn model_name(&self) -> &str {
            "slow"
        }

        fn dimension(&self) -> usize {
            TEST_DIM
        }

        fn max_tokens(&self) -> usize {
            512
        }

        async fn embed_text(
            &self,
            texts: &[&str],
            _config: &EmbeddingConfig,
        ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
            tokio::time::sleep(self.delay).await;
            Ok(texts
                .iter()
                .map(|_| EmbeddingOutput {
                    embedding: vec![0.0; TEST_DIM],
                    token_count: 0,
                })
                .collect())
        }
    }

    /// Holds its thread for `delay` without yielding.
    struct BlockingEmbedder {
        delay: Duration,
    }

    #[async_trait]
    impl Embedder for BlockingEmbedder {
        fn model_name(&self) -> &str {
            "blocking"
        }

        fn dimension(&self) -> usize {
            TEST_DIM
        }

        fn max_tokens(&self) -> usize {
            512
        }

        async fn embed_text(
            &self,
            texts: &[&str],
            _config: &EmbeddingConfig,
        ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
            std::thread::sleep(self.delay);
            Ok(texts
                .iter()
                .map(|_| EmbeddingOutput {
                    embedding: vec![0.0; TEST_DIM],
                    token_count: 0,
                })
                .collect())
        }
    }

    fn hash_pool(max_concurrent: usize) -> EmbedderPool {
        EmbedderPool::new(Arc::new(HashEmbedder::with_dimension(TEST_DIM)), max_concurrent)
    }

    #[tokio::test]
    async fn test_pool_creation() {
        let pool = hash_pool(4);

        assert_eq!(pool.dimension(), TEST_DIM);
        assert_eq!(pool.model_name(), "hash-64");
        assert_eq!(pool.max_concurrent(), 4);
        assert_eq!(pool.available_permits(), 4);
        assert_eq!(pool.timeout(), DEFAULT_EMBED_TIMEOUT);
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let pool = hash_pool(4);
        let config = EmbeddingConfig::default();

        let results = pool
            .embed_text(&["hello world", "test embedding"], &config)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].embedding.len(), TEST_DIM);
    }

    #[tokio::test]
    async fn test_embed_query() {
        let pool = hash_pool(4);
        let result = pool
            .embed_query("search query", &EmbeddingConfig::default())
            .await
            .unwrap();

        assert_eq!(result.embedding.len(), TEST_DIM);
        assert_eq!(result.token_count, 2);
    }

    #[tokio::test]
    async fn test_permits_returned_after_concurrent_calls() {
        let pool = Arc::new(hash_pool(2));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    let query = format!("query {i}");
                    pool.embed_query(&query, &EmbeddingConfig::default()).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(pool.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_error() {
        let pool = EmbedderPool::with_timeout(
            Arc::new(SlowEmbedder {
                delay: Duration::from_secs(5),
            }),
            1,
            Duration::from_millis(20),
        );

        let err = pool
            .embed_query("late", &EmbeddingConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, EmbedError::Timeout(d) if d == Duration::from_millis(20)));
        assert_eq!(pool.available_permits(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_fires_while_embedder_blocks_thread() {
        let pool = EmbedderPool::with_timeout(
            Arc::new(BlockingEmbedder {
                delay: Duration::from_millis(500),
            }),
            1,
            Duration::from_millis(50),
        );

        let started = std::time::Instant::now();
        let err = pool
            .embed_query("stuck", &EmbeddingConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, EmbedError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let pool = hash_pool(0);
        assert_eq!(pool.max_concurrent(), 1);
        pool.embed_query("still works", &EmbeddingConfig::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = hash_pool(4);
        let texts: Vec<&str> = vec![];
        let results = pool
            .embed_text(&texts, &EmbeddingConfig::default())
            .await
            .unwrap();

        assert!(results.is_empty());
    }
}
