//! surveydb-hybrid
//!
//! Query analysis, rank fusion, the hybrid retriever and the ingestion
//! pipeline that keeps both indexes in step.

use std::sync::Arc;

use surveydb_core::chunker::Chunker;
use surveydb_core::config::{expand_path, Settings};
use surveydb_core::error::Result;
use surveydb_core::traits::EmbeddingProvider;
use surveydb_embed::{build_embedder, build_reranker};
use surveydb_text::KeywordIndex;
use surveydb_vector::LanceVectorIndex;

pub mod analyzer;
pub mod fusion;
pub mod ingest;
pub mod retriever;

pub use analyzer::analyze;
pub use fusion::{reciprocal_rank_fusion, DEFAULT_RANK_CONSTANT};
pub use ingest::{load_catalog, refresh_keyword_index, IndexBuilder, IngestOutcome, IngestReport};
pub use retriever::{HybridRetriever, RetrievalOutcome};

/// Every long-lived component, wired from one [`Settings`].
pub struct Engine {
    pub settings: Settings,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vector: Arc<LanceVectorIndex>,
    pub keyword: Arc<KeywordIndex>,
}

impl Engine {
    /// Open the vector store and bind it to the configured embedder. The
    /// keyword index starts empty; call [`Engine::refresh_keyword_index`].
    pub async fn open(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let embedder = build_embedder(&settings.embeddings)?;
        let db_path = expand_path(&settings.data.lancedb_dir);
        let vector = LanceVectorIndex::open(&db_path, &settings.data.table, embedder.dimension()).await?;
        vector.bind_embedder(embedder.embedder_id()).await?;
        let keyword = KeywordIndex::new(settings.bm25)?;
        Ok(Self { settings, embedder, vector: Arc::new(vector), keyword: Arc::new(keyword) })
    }

    pub async fn refresh_keyword_index(&self) -> Result<usize> {
        refresh_keyword_index(self.vector.as_ref(), &self.keyword).await
    }

    pub fn index_builder(&self) -> Result<IndexBuilder> {
        let chunker = Chunker::new(self.settings.chunking)?;
        IndexBuilder::new(chunker, Arc::clone(&self.embedder), self.vector.clone(), self.settings.retrieval.embed_batch_size)
    }

    /// The reranker model is only loaded when `retrieval.enable_reranker` is set.
    pub fn retriever(&self) -> Result<HybridRetriever> {
        let retriever = HybridRetriever::new(
            Arc::clone(&self.embedder),
            self.vector.clone(),
            Arc::clone(&self.keyword),
            self.settings.retrieval.clone(),
        )?;
        if self.settings.retrieval.enable_reranker {
            return Ok(retriever.with_reranker(build_reranker(&self.settings.reranker)?));
        }
        Ok(retriever)
    }
}
