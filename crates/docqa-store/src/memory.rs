//! In-memory store for testing without `LanceDB`.
//!
//! Same ordering and dimension rules as the `LanceDB` store:
//! brute-force distance under the configured metric, ties broken by
//! insertion sequence, and a replaced entry keeps its original sequence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docqa_core::{
    DistanceMetric, IndexEntry, SearchQuery, SearchResult, StoreError, StoreStats, UpsertOutcome,
    VectorStore,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::rank_candidates;

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, (u64, IndexEntry)>,
    next_seq: u64,
    dimension: Option<usize>,
    last_updated: Option<DateTime<Utc>>,
}

/// In-memory vector store.
///
/// # Example
///
/// ```rust
/// use docqa_store::MemoryStore;
/// use docqa_core::VectorStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// store.init().await?;
///
/// let stats = store.stats().await?;
/// assert_eq!(stats.total_entries, 0);
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    metric: DistanceMetric,
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create a new in-memory store using squared L2 distance.
    #[must_use]
    pub fn new() -> Self {
        Self::with_metric(DistanceMetric::default())
    }

    #[must_use]
    pub fn with_metric(metric: DistanceMetric) -> Self {
        Self {
            metric,
            state: RwLock::new(MemoryState::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        debug!("MemoryStore initialized (metric: {})", self.metric.as_str());
        Ok(())
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn dimension(&self) -> Option<usize> {
        self.state.read().await.dimension
    }

    async fn upsert(&self, entry: &IndexEntry) -> Result<UpsertOutcome, StoreError> {
        let actual = entry.embedding.len();
        if actual == 0 {
            return Err(StoreError::Insert("embedding is empty".to_string()));
        }

        let mut state = self.state.write().await;
        match state.dimension {
            Some(expected) if expected != actual => {
                return Err(StoreError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => state.dimension = Some(actual),
        }

        let seq = match state.entries.get(&entry.id) {
            Some((seq, _)) => *seq,
            None => {
                let seq = state.next_seq;
                state.next_seq += 1;
                seq
            }
        };
        let previous = state.entries.insert(entry.id.clone(), (seq, entry.clone()));
        state.last_updated = Some(Utc::now());

        debug!("Upserted '{}' (seq {})", entry.id, seq);
        Ok(if previous.is_some() {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn query(&self, query: SearchQuery) -> Result<Vec<SearchResult>, StoreError> {
        let state = self.state.read().await;

        if query.limit == 0 || state.entries.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = state.dimension {
            if expected != query.embedding.len() {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: query.embedding.len(),
                });
            }
        }

        let candidates = state.entries.values().map(|(seq, entry)| {
            (
                *seq,
                SearchResult {
                    id: entry.id.clone(),
                    text: entry.text.clone(),
                    distance: self.metric.distance(&query.embedding, &entry.embedding),
                },
            )
        });

        Ok(rank_candidates(candidates, query.limit))
    }

    async fn get(&self, id: &str) -> Result<Option<IndexEntry>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .entries
            .get(id)
            .map(|(_, entry)| entry.clone()))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.state.read().await.entries.len() as u64)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.state.read().await;
        Ok(StoreStats {
            total_entries: state.entries.len() as u64,
            dimension: state.dimension,
            metric: self.metric,
            last_updated: state.last_updated,
        })
    }
}
