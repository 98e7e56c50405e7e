//! surveydb-text
//!
//! In-memory BM25 keyword search over chunk text, tokenized with a tantivy
//! analyzer. The index is rebuilt from the vector store's corpus at startup
//! and after ingestion; it is never persisted.
pub mod tantivy_utils;
pub mod index;

pub use index::KeywordIndex;
