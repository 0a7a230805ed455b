//! Query execution.

use docqa_core::{
    AnswerSet, Embedder, EmbeddingConfig, Error, SearchQuery, SearchResult, VectorStore,
};
use std::sync::Arc;
use tracing::debug;

/// Default number of answers.
pub const DEFAULT_LIMIT: usize = 5;

/// Upper bound applied to caller-supplied result counts.
pub const DEFAULT_MAX_LIMIT: usize = 100;

/// Query executor.
pub struct QueryExecutor {
    /// Vector store
    store: Arc<dyn VectorStore>,
    /// Embedder for query embedding
    embedder: Arc<dyn Embedder>,
    /// Used when the caller gives no count
    default_limit: usize,
    /// Caller counts are clamped to this
    max_limit: usize,
    config: EmbeddingConfig,
}

impl QueryExecutor {
    /// Create a new query executor.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        default_limit: usize,
        max_limit: usize,
    ) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            store,
            embedder,
            default_limit: default_limit.min(max_limit),
            max_limit,
            config: EmbeddingConfig::default(),
        }
    }

    /// Effective result count for a requested `k`.
    #[must_use]
    pub fn limit_for(&self, k: Option<usize>) -> usize {
        k.unwrap_or(self.default_limit).min(self.max_limit)
    }

    /// Embed `question` and return the nearest stored documents, closest
    /// first.
    pub async fn search(&self, question: &str, k: Option<usize>) -> Result<Vec<SearchResult>, Error> {
        let limit = self.limit_for(k);
        debug!("Executing query with limit {}: {}", limit, question);

        let embedding = self.embedder.embed_query(question, &self.config).await?;

        let results = self
            .store
            .query(SearchQuery {
                embedding: embedding.embedding,
                limit,
            })
            .await?;

        debug!("Found {} results", results.len());
        Ok(results)
    }

    /// Ranked answers for `question`, as returned to clients.
    pub async fn answer(&self, question: &str, k: Option<usize>) -> Result<AnswerSet, Error> {
        let results = self.search(question, k).await?;
        Ok(AnswerSet {
            answers: results.into_iter().map(Into::into).collect(),
        })
    }
}
