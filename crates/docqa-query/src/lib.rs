//! Question answering for docqa: embed the question, rank stored documents.

pub mod executor;

pub use executor::{DEFAULT_LIMIT, DEFAULT_MAX_LIMIT, QueryExecutor};
