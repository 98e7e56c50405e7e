use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chunk, MetadataFilter, RankedResult, RerankCandidate, ScoredChunk};

/// Maps text to fixed-dimension vectors. Backends are chosen once at startup.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the backend/model (e.g., `ollama:nomic-embed-text:d768`).
    fn embedder_id(&self) -> &str;
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    /// Output order matches input order; one failed item fails the whole call.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite chunks by `chunk_id`. Chunks without an embedding
    /// are stored but never returned by `search`.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;
    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<()>;
    /// Swap a document's whole chunk set in one commit.
    async fn replace_document(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()>;
    /// Cosine similarity, filtered before the top-k cut, ties by chunk id.
    async fn search(&self, query_vec: &[f32], filter: &MetadataFilter, k: usize) -> Result<Vec<ScoredChunk>>;
    /// Every stored chunk (without vectors); feeds the keyword index at startup.
    async fn all_chunks(&self) -> Result<Vec<Chunk>>;
    /// Fingerprint recorded at the document's last ingestion, if any.
    async fn document_fingerprint(&self, doc_id: &str) -> Result<Option<String>>;
    async fn count(&self) -> Result<usize>;
}

/// Pairwise relevance model. Must return exactly the candidate set, reordered.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate]) -> Result<Vec<RankedResult>>;
}
