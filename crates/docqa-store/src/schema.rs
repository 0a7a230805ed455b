//! Arrow schema for the `LanceDB` entries table.

use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Document identifier, the merge key.
pub const DOC_ID: &str = "doc_id";
/// Extracted text returned with search results.
pub const CONTENT: &str = "content";
/// Insertion sequence number, used to break distance ties.
pub const SEQ: &str = "seq";
/// `DocumentMetadata` serialised as JSON.
pub const METADATA: &str = "metadata";
/// Embedding column searched by `vector_search`.
pub const VECTOR: &str = "vector";
/// Distance column added by `LanceDB` to search results.
pub const DISTANCE: &str = "_distance";

/// Schema for one collection's entries table.
#[must_use]
pub fn entries_schema(embedding_dim: usize) -> Schema {
    Schema::new(vec![
        // Identity
        Field::new(DOC_ID, DataType::Utf8, false),
        Field::new(SEQ, DataType::UInt64, false),
        // Content
        Field::new(CONTENT, DataType::Utf8, false),
        Field::new(METADATA, DataType::Utf8, false),
        // Embedding
        Field::new(
            VECTOR,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                embedding_dim as i32,
            ),
            false,
        ),
    ])
}

/// Embedding dimension declared by an existing table schema.
#[must_use]
pub fn vector_dimension(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(VECTOR).ok()?.data_type() {
        DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
        _ => None,
    }
}
