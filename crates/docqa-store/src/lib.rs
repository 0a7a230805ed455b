//! Vector index for docqa.
//!
//! This crate provides the storage backends behind the
//! [`VectorStore`](docqa_core::VectorStore) trait:
//!
//! - [`LanceStore`]: persistent store, one `LanceDB` table per collection
//!   (requires the `lancedb` feature, enabled by default)
//! - [`MemoryStore`]: in-process store for tests and ephemeral use
//!
//! Both implement the same contract: upsert by identifier, a dimension fixed
//! by the first write, and k-nearest queries ordered by ascending distance
//! with ties broken by insertion order.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_store::LanceStore;
//! use docqa_core::{SearchQuery, VectorStore};
//!
//! let store = LanceStore::new("path/to/data".into(), "documents");
//! store.init().await?;
//!
//! store.upsert(&entry).await?;
//! let results = store.query(SearchQuery { embedding, limit: 5 }).await?;
//! ```

#[cfg(feature = "lancedb")]
pub mod lancedb;
#[cfg(feature = "lancedb")]
pub mod schema;

pub mod memory;

#[cfg(feature = "lancedb")]
pub use crate::lancedb::LanceStore;
pub use memory::MemoryStore;

use docqa_core::SearchResult;

/// Order `(seq, result)` candidates by ascending distance, then sequence,
/// and keep the first `limit`.
pub(crate) fn rank_candidates(
    candidates: impl IntoIterator<Item = (u64, SearchResult)>,
    limit: usize,
) -> Vec<SearchResult> {
    let mut ranked: Vec<_> = candidates.into_iter().collect();
    ranked.sort_by(|(seq_a, a), (seq_b, b)| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| seq_a.cmp(seq_b))
    });
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, result)| result)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, distance: f32) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            text: String::new(),
            distance,
        }
    }

    #[test]
    fn test_rank_candidates_orders_and_truncates() {
        let ranked = rank_candidates(
            vec![
                (0, result("c", 3.0)),
                (1, result("a", 1.0)),
                (2, result("b", 2.0)),
            ],
            2,
        );
        let ids: Vec<_> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_rank_candidates_tie_uses_sequence() {
        let ranked = rank_candidates(vec![(5, result("late", 1.0)), (2, result("early", 1.0))], 10);
        assert_eq!(ranked[0].id, "early");
        assert_eq!(ranked[1].id, "late");
    }
}
