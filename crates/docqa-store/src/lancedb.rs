//! `LanceDB` implementation of `VectorStore`.

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt64Array,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docqa_core::{
    DistanceMetric, DocumentMetadata, IndexEntry, SearchQuery, SearchResult, StoreError,
    StoreStats, UpsertOutcome, VectorStore,
};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table, connect};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::rank_candidates;
use crate::schema::{CONTENT, DISTANCE, DOC_ID, METADATA, SEQ, VECTOR, entries_schema, vector_dimension};

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "documents";

/// Open entries table and the dimension its schema declares.
#[derive(Clone)]
struct OpenTable {
    table: Table,
    dimension: usize,
}

/// LanceDB-based vector store.
///
/// Each collection is a table named after it inside `db_path`. The table is
/// created by the first upsert, which also fixes the embedding dimension.
pub struct LanceStore {
    /// Directory holding the `LanceDB` database
    db_path: PathBuf,
    /// Table name
    collection: String,
    metric: DistanceMetric,
    /// Database connection, set by `init`
    connection: RwLock<Option<Connection>>,
    /// Entries table, once it exists
    table: RwLock<Option<OpenTable>>,
    next_seq: AtomicU64,
    last_updated: RwLock<Option<DateTime<Utc>>>,
    /// Serialises writers to the same identifier
    id_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LanceStore {
    /// Create a new `LanceStore` using squared L2 distance.
    #[must_use]
    pub fn new(db_path: PathBuf, collection: impl Into<String>) -> Self {
        Self {
            db_path,
            collection: collection.into(),
            metric: DistanceMetric::default(),
            connection: RwLock::new(None),
            table: RwLock::new(None),
            next_seq: AtomicU64::new(0),
            last_updated: RwLock::new(None),
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Use a different distance metric. Must match the metric the
    /// collection was queried with before.
    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Get the database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get the collection (table) name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::Unavailable("store not initialized".to_string()))
    }

    async fn open_table(&self) -> Option<OpenTable> {
        self.table.read().await.clone()
    }

    /// Existing table, or a new one with `dimension` if none exists yet.
    async fn table_for(&self, dimension: usize) -> Result<OpenTable, StoreError> {
        if let Some(open) = self.open_table().await {
            return Ok(open);
        }

        let conn = self.connection().await?;
        let mut slot = self.table.write().await;
        if let Some(open) = slot.as_ref() {
            return Ok(open.clone());
        }

        info!(
            "Creating table '{}' with dimension {}",
            self.collection, dimension
        );
        let table = conn
            .create_empty_table(&self.collection, Arc::new(entries_schema(dimension)))
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to create table: {e}")))?;

        let open = OpenTable { table, dimension };
        *slot = Some(open.clone());
        Ok(open)
    }

    async fn lock_id(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.id_locks.lock().await;
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    async fn release_id(&self, id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.id_locks.lock().await;
        // map + caller: nobody else is waiting
        if Arc::strong_count(lock) <= 2 {
            locks.remove(id);
        }
    }

    /// Sequence number of an existing row.
    async fn existing_seq(&self, table: &Table, id: &str) -> Result<Option<u64>, StoreError> {
        let mut results = table
            .query()
            .only_if(id_filter(id))
            .limit(1)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to look up entry: {e}")))?;

        if let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch entry: {e}")))?
        {
            if batch.num_rows() > 0 {
                return Ok(Some(u64_column(&batch, SEQ)?.value(0)));
            }
        }
        Ok(None)
    }

    /// Recover the next sequence number and last write time from a table.
    async fn recover(&self, table: &Table) -> Result<(), StoreError> {
        let mut results = table
            .query()
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to scan table: {e}")))?;

        let mut next_seq = 0u64;
        let mut last_updated: Option<DateTime<Utc>> = None;
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to read table: {e}")))?
        {
            let seqs = u64_column(&batch, SEQ)?;
            let metadata = string_column(&batch, METADATA)?;
            for i in 0..batch.num_rows() {
                next_seq = next_seq.max(seqs.value(i) + 1);
                let indexed_at = serde_json::from_str::<DocumentMetadata>(metadata.value(i))
                    .ok()
                    .and_then(|m| m.indexed_at);
                if indexed_at > last_updated {
                    last_updated = indexed_at;
                }
            }
        }

        self.next_seq.store(next_seq, Ordering::SeqCst);
        *self.last_updated.write().await = last_updated;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn init(&self) -> Result<(), StoreError> {
        info!(
            "Initializing LanceDB at {:?} (collection '{}')",
            self.db_path, self.collection
        );
        validate_collection(&self.collection)?;

        tokio::fs::create_dir_all(&self.db_path)
            .await
            .map_err(|e| StoreError::Init(format!("Failed to create db directory: {e}")))?;

        let conn = connect(&self.db_path.to_string_lossy())
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to connect to LanceDB: {e}")))?;

        let tables = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to list tables: {e}")))?;

        if tables.contains(&self.collection) {
            let table = conn
                .open_table(&self.collection)
                .execute()
                .await
                .map_err(|e| StoreError::Init(format!("Failed to open table: {e}")))?;
            let schema = table
                .schema()
                .await
                .map_err(|e| StoreError::Schema(format!("Failed to read schema: {e}")))?;
            let dimension = vector_dimension(&schema).ok_or_else(|| {
                StoreError::Schema(format!("table '{}' has no vector column", self.collection))
            })?;

            self.recover(&table).await?;
            debug!(
                "Opened table '{}' (dimension {}, next seq {})",
                self.collection,
                dimension,
                self.next_seq.load(Ordering::SeqCst)
            );
            *self.table.write().await = Some(OpenTable { table, dimension });
        }

        *self.connection.write().await = Some(conn);
        info!("LanceDB initialized successfully");
        Ok(())
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn dimension(&self) -> Option<usize> {
        self.open_table().await.map(|open| open.dimension)
    }

    async fn upsert(&self, entry: &IndexEntry) -> Result<UpsertOutcome, StoreError> {
        let actual = entry.embedding.len();
        if actual == 0 {
            return Err(StoreError::Insert("embedding is empty".to_string()));
        }
        let metadata = serde_json::to_string(&entry.metadata)
            .map_err(|e| StoreError::Insert(format!("Failed to encode metadata: {e}")))?;

        let open = self.table_for(actual).await?;
        if open.dimension != actual {
            return Err(StoreError::DimensionMismatch {
                expected: open.dimension,
                actual,
            });
        }

        let lock = self.lock_id(&entry.id).await;
        let guard = lock.lock().await;

        let result = async {
            let existing = self.existing_seq(&open.table, &entry.id).await?;
            let seq = match existing {
                Some(seq) => seq,
                None => self.next_seq.fetch_add(1, Ordering::SeqCst),
            };

            let batch = entry_to_batch(entry, seq, &metadata, open.dimension)?;
            let schema = batch.schema();
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

            let mut merge = open.table.merge_insert(&[DOC_ID]);
            merge
                .when_matched_update_all(None)
                .when_not_matched_insert_all();
            merge
                .execute(Box::new(batches))
                .await
                .map_err(|e| StoreError::Insert(format!("Failed to upsert entry: {e}")))?;

            debug!("Upserted '{}' (seq {})", entry.id, seq);
            Ok(if existing.is_some() {
                UpsertOutcome::Replaced
            } else {
                UpsertOutcome::Inserted
            })
        }
        .await;

        drop(guard);
        self.release_id(&entry.id, &lock).await;

        if result.is_ok() {
            *self.last_updated.write().await = Some(Utc::now());
        }
        result
    }

    async fn query(&self, query: SearchQuery) -> Result<Vec<SearchResult>, StoreError> {
        debug!("Searching with limit {}", query.limit);

        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let Some(open) = self.open_table().await else {
            return Ok(Vec::new());
        };

        let total = open
            .table
            .count_rows(None)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count rows: {e}")))?;
        if total == 0 {
            return Ok(Vec::new());
        }
        if query.embedding.len() != open.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: open.dimension,
                actual: query.embedding.len(),
            });
        }

        // Every row is scored so that ties at the cut-off fall back to
        // insertion order rather than engine order.
        let mut results = open
            .table
            .vector_search(query.embedding)
            .map_err(|e| StoreError::Query(format!("Failed to create search query: {e}")))?
            .distance_type(distance_type(self.metric))
            .limit(total)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to execute search: {e}")))?;

        let mut candidates = Vec::with_capacity(total);
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch results: {e}")))?
        {
            candidates.extend(batch_to_candidates(&batch, self.metric)?);
        }

        let ranked = rank_candidates(candidates, query.limit);
        debug!("Found {} results", ranked.len());
        Ok(ranked)
    }

    async fn get(&self, id: &str) -> Result<Option<IndexEntry>, StoreError> {
        let Some(open) = self.open_table().await else {
            return Ok(None);
        };

        let mut results = open
            .table
            .query()
            .only_if(id_filter(id))
            .limit(1)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to query entry: {e}")))?;

        if let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch entry: {e}")))?
        {
            return Ok(batch_to_entries(&batch)?.into_iter().next());
        }
        Ok(None)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let Some(open) = self.open_table().await else {
            return Ok(0);
        };
        let rows = open
            .table
            .count_rows(None)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count rows: {e}")))?;
        Ok(rows as u64)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            total_entries: self.count().await?,
            dimension: self.dimension().await,
            metric: self.metric,
            last_updated: *self.last_updated.read().await,
        })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Table names double as directory names inside the database.
fn validate_collection(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::Init(format!(
            "invalid collection name '{name}': use letters, digits, '_', '-' or '.'"
        )))
    }
}

fn distance_type(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::L2 => DistanceType::L2,
        DistanceMetric::Cosine => DistanceType::Cosine,
        DistanceMetric::Dot => DistanceType::Dot,
    }
}

fn id_filter(id: &str) -> String {
    format!("{DOC_ID} = '{}'", id.replace('\'', "''"))
}

fn entry_to_batch(
    entry: &IndexEntry,
    seq: u64,
    metadata: &str,
    dimension: usize,
) -> Result<RecordBatch, StoreError> {
    let schema = Arc::new(entries_schema(dimension));

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec![entry.id.as_str()])),
            Arc::new(UInt64Array::from(vec![seq])),
            Arc::new(StringArray::from(vec![entry.text.as_str()])),
            Arc::new(StringArray::from(vec![metadata])),
            build_vector_array(&entry.embedding, dimension),
        ],
    )
    .map_err(|e| StoreError::Insert(format!("Failed to create RecordBatch: {e}")))
}

fn build_vector_array(embedding: &[f32], dimension: usize) -> ArrayRef {
    let mut builder = FixedSizeListBuilder::new(Float32Builder::new(), dimension as i32);
    builder.values().append_slice(embedding);
    builder.append(true);
    Arc::new(builder.finish())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Schema(format!("missing string column '{name}'")))
}

fn u64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
        .ok_or_else(|| StoreError::Schema(format!("missing u64 column '{name}'")))
}

/// LanceDB scores a zero vector under cosine as NaN; the cosine distance
/// involving a zero vector is defined as 1.
fn normalize_distance(metric: DistanceMetric, raw: f32) -> f32 {
    if metric == DistanceMetric::Cosine && !raw.is_finite() {
        1.0
    } else {
        raw
    }
}

fn batch_to_candidates(
    batch: &RecordBatch,
    metric: DistanceMetric,
) -> Result<Vec<(u64, SearchResult)>, StoreError> {
    let ids = string_column(batch, DOC_ID)?;
    let contents = string_column(batch, CONTENT)?;
    let seqs = u64_column(batch, SEQ)?;
    let distances = batch
        .column_by_name(DISTANCE)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| StoreError::Query("search result has no distance column".to_string()))?;

    Ok((0..batch.num_rows())
        .map(|i| {
            (
                seqs.value(i),
                SearchResult {
                    id: ids.value(i).to_string(),
                    text: contents.value(i).to_string(),
                    distance: normalize_distance(metric, distances.value(i)),
                },
            )
        })
        .collect())
}

fn batch_to_entries(batch: &RecordBatch) -> Result<Vec<IndexEntry>, StoreError> {
    let ids = string_column(batch, DOC_ID)?;
    let contents = string_column(batch, CONTENT)?;
    let metadata = string_column(batch, METADATA)?;
    let vectors = batch
        .column_by_name(VECTOR)
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| StoreError::Schema(format!("missing vector column '{VECTOR}'")))?;

    let mut entries = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let values = vectors.value(i);
        let embedding = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| StoreError::Schema("vector items are not f32".to_string()))?
            .values()
            .to_vec();
        let metadata = serde_json::from_str(metadata.value(i))
            .map_err(|e| StoreError::Schema(format!("invalid metadata JSON: {e}")))?;

        entries.push(IndexEntry {
            id: ids.value(i).to_string(),
            text: contents.value(i).to_string(),
            embedding,
            metadata,
        });
    }
    Ok(entries)
}
