//! surveydb-vector
//!
//! LanceDB-backed [`VectorIndex`]: one `chunks` table holding chunk text,
//! denormalized document metadata and an optional embedding per row.
use async_trait::async_trait;
use lancedb::{Connection, Table};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use arrow_schema::Schema;

use surveydb_core::error::{Error, Result};
use surveydb_core::traits::VectorIndex;
use surveydb_core::types::{Chunk, MetadataFilter, ScoredChunk};

pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

use crate::schema::build_chunks_schema;
use crate::table::{ensure_chunks_table, get_meta, open_db, set_meta};

const EMBEDDER_KEY: &str = "embedder_id";

/// Tables are opened per operation so every read sees the latest commit.
/// Writes are serialized through `write_lock`.
pub struct LanceVectorIndex {
    db: Connection,
    table_name: String,
    dim: usize,
    schema: Arc<Schema>,
    write_lock: Mutex<()>,
}

impl LanceVectorIndex {
    /// Open (or create) `table_name` under `db_path` for `dim`-wide vectors.
    /// An existing table with a different vector width is rejected.
    pub async fn open(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
        std::fs::create_dir_all(db_path)?;
        let db = open_db(db_path.to_string_lossy().as_ref()).await?;
        ensure_chunks_table(&db, table_name, dim).await?;
        let width = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("embedding dimension {dim} is too large")))?;
        info!(path = %db_path.display(), table = table_name, dim, "vector index opened");
        Ok(Self { db, table_name: table_name.to_string(), dim, schema: build_chunks_schema(width), write_lock: Mutex::new(()) })
    }

    /// Record which embedder wrote the vectors; warn when it differs from the last one.
    pub async fn bind_embedder(&self, embedder_id: &str) -> Result<()> {
        match get_meta(&self.db, EMBEDDER_KEY).await? {
            Some(prev) if prev == embedder_id => return Ok(()),
            Some(prev) => warn!(stored = %prev, current = embedder_id, "vectors were produced by a different embedder; re-ingest to refresh them"),
            None => {}
        }
        let _guard = self.write_lock.lock().await;
        set_meta(&self.db, EMBEDDER_KEY, embedder_id).await
    }

    async fn table(&self) -> Result<Table> {
        self.db.open_table(&self.table_name).execute().await.map_err(Error::storage)
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let table = self.table().await?;
        writer::upsert_chunks(&table, self.schema.clone(), self.dim, chunks).await?;
        debug!(rows = chunks.len(), "upserted chunks");
        Ok(())
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let table = self.table().await?;
        writer::delete_document_rows(&table, doc_id).await?;
        debug!(doc_id, "deleted document rows");
        Ok(())
    }

    async fn replace_document(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let table = self.table().await?;
        writer::replace_document_rows(&table, self.schema.clone(), self.dim, doc_id, chunks).await?;
        debug!(doc_id, rows = chunks.len(), "replaced document rows");
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], filter: &MetadataFilter, k: usize) -> Result<Vec<ScoredChunk>> {
        if query_vec.len() != self.dim {
            return Err(Error::DimensionMismatch { provider: query_vec.len(), stored: self.dim });
        }
        let table = self.table().await?;
        let hits = search::search_chunks(&table, query_vec, filter, k).await?;
        debug!(k, hits = hits.len(), "vector search");
        Ok(hits)
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let table = self.table().await?;
        search::scan_chunks(&table).await
    }

    async fn document_fingerprint(&self, doc_id: &str) -> Result<Option<String>> {
        let table = self.table().await?;
        search::fingerprint_of(&table, doc_id).await
    }

    async fn count(&self) -> Result<usize> {
        let table = self.table().await?;
        table.count_rows(None).await.map_err(Error::storage)
    }
}
