use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use surveydb_core::config::RetrievalSettings;
use surveydb_core::error::{Error, Result};
use surveydb_core::traits::{EmbeddingProvider, Reranker, VectorIndex};
use surveydb_core::types::{
    Chunk, MetadataFilter, QueryEntities, RankedResult, RerankCandidate, RetrievedChunk, ScoredChunk, SourceKind,
};
use surveydb_text::KeywordIndex;

use crate::analyzer::analyze;
use crate::fusion::reciprocal_rank_fusion;

/// Everything one retrieval decided, for callers that log or display it.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    pub entities: QueryEntities,
    pub filter: MetadataFilter,
    pub chunks: Vec<RetrievedChunk>,
    /// The semantic branch failed and only keyword results were fused.
    pub semantic_degraded: bool,
    pub reranked: bool,
    pub semantic_hits: usize,
    pub keyword_hits: usize,
}

/// Query-time orchestration over both indexes. Stateless per request and
/// `Send + Sync`, so one instance serves concurrent queries.
pub struct HybridRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    vector: Arc<dyn VectorIndex>,
    keyword: Arc<KeywordIndex>,
    reranker: Option<Arc<dyn Reranker>>,
    settings: RetrievalSettings,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vector: Arc<dyn VectorIndex>,
        keyword: Arc<KeywordIndex>,
        settings: RetrievalSettings,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self { embedder, vector, keyword, reranker: None, settings })
    }

    /// Attach a reranker; it is only consulted when `enable_reranker` is set.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub async fn retrieve(&self, query: &str, k_final: usize) -> Result<Vec<RetrievedChunk>> {
        Ok(self.retrieve_detailed(query, k_final).await?.chunks)
    }

    pub async fn retrieve_detailed(&self, query: &str, k_final: usize) -> Result<RetrievalOutcome> {
        let entities = analyze(query);
        let filter = entities.to_filter();
        let mut outcome = RetrievalOutcome {
            entities,
            filter: filter.clone(),
            chunks: Vec::new(),
            semantic_degraded: false,
            reranked: false,
            semantic_hits: 0,
            keyword_hits: 0,
        };
        if !self.keyword.is_ready() {
            return Err(Error::NotReady);
        }
        if query.trim().is_empty() || k_final == 0 {
            return Ok(outcome);
        }

        let k = self.settings.k_candidates;
        let (semantic, keyword) = tokio::join!(self.semantic_branch(query, &filter, k), self.keyword_branch(query, &filter, k));
        let keyword = keyword?;
        let semantic = match semantic {
            Ok(hits) => hits,
            Err(e @ (Error::Embedding { .. } | Error::DimensionMismatch { .. })) => {
                warn!(error = %e, embedder = self.embedder.embedder_id(), "semantic branch failed; using keyword results only");
                outcome.semantic_degraded = true;
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        outcome.semantic_hits = semantic.len();
        outcome.keyword_hits = keyword.len();

        let sem_ranked: Vec<RankedResult> = semantic.iter().map(|h| h.ranked(SourceKind::Semantic)).collect();
        let kw_ranked: Vec<RankedResult> = keyword.iter().map(|h| h.ranked(SourceKind::Keyword)).collect();
        let mut by_id: HashMap<String, Chunk> = HashMap::new();
        for hit in semantic.into_iter().chain(keyword) {
            by_id.entry(hit.chunk.chunk_id.clone()).or_insert(hit.chunk);
        }

        let mut ordered = reciprocal_rank_fusion(&[sem_ranked.as_slice(), kw_ranked.as_slice()], self.settings.rank_constant);
        debug!(semantic = outcome.semantic_hits, keyword = outcome.keyword_hits, fused = ordered.len(), "fused candidates");

        if self.settings.enable_reranker {
            if let Some(reranker) = &self.reranker {
                if let Some(reordered) = self.rerank(reranker.as_ref(), query, &ordered, &by_id).await {
                    ordered = reordered;
                    outcome.reranked = true;
                }
            }
        }

        let mut seen = HashSet::new();
        for r in ordered {
            if outcome.chunks.len() == k_final {
                break;
            }
            if !seen.insert(r.chunk_id.clone()) {
                continue;
            }
            let Some(chunk) = by_id.remove(&r.chunk_id) else { continue };
            outcome.chunks.push(RetrievedChunk {
                chunk_id: r.chunk_id,
                text: chunk.text,
                score: r.score,
                source: r.source,
                metadata: chunk.metadata,
            });
        }
        Ok(outcome)
    }

    async fn semantic_branch(&self, query: &str, filter: &MetadataFilter, k: usize) -> Result<Vec<ScoredChunk>> {
        let timeout = Duration::from_millis(self.settings.embed_timeout_ms);
        let vector = match tokio::time::timeout(timeout, self.embedder.embed(query)).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::embedding(format!("query embedding timed out after {timeout:?}"), true)),
        };
        self.vector.search(&vector, filter, k).await
    }

    async fn keyword_branch(&self, query: &str, filter: &MetadataFilter, k: usize) -> Result<Vec<ScoredChunk>> {
        let keyword = Arc::clone(&self.keyword);
        let (query, filter) = (query.to_string(), filter.clone());
        tokio::task::spawn_blocking(move || keyword.search(&query, &filter, k))
            .await
            .map_err(|e| Error::Operation(format!("keyword search task failed: {e}")))?
    }

    /// Rerank the head of `fused`; the reranked block is followed by the rest of
    /// the fused order. `None` (after a warning) when the reranker fails or does
    /// not return a permutation of its input.
    async fn rerank(
        &self,
        reranker: &dyn Reranker,
        query: &str,
        fused: &[RankedResult],
        chunks: &HashMap<String, Chunk>,
    ) -> Option<Vec<RankedResult>> {
        let head_len = self.settings.k_rerank_input.min(fused.len());
        let (head, tail) = fused.split_at(head_len);
        if head.is_empty() {
            return None;
        }
        let candidates: Vec<RerankCandidate> = head
            .iter()
            .filter_map(|r| chunks.get(&r.chunk_id).map(|c| RerankCandidate { chunk_id: r.chunk_id.clone(), text: c.text.clone() }))
            .collect();
        let reranked = match reranker.rerank(query, &candidates).await {
            Ok(reranked) => reranked,
            Err(e) => {
                warn!(error = %e, "reranker failed; keeping fused order");
                return None;
            }
        };
        let expected: HashSet<&str> = candidates.iter().map(|c| c.chunk_id.as_str()).collect();
        let returned: HashSet<&str> = reranked.iter().map(|r| r.chunk_id.as_str()).collect();
        if reranked.len() != candidates.len() || returned != expected {
            warn!(expected = candidates.len(), returned = reranked.len(), "reranker output is not a permutation of its input; keeping fused order");
            return None;
        }
        let mut out: Vec<RankedResult> = reranked
            .into_iter()
            .map(|r| RankedResult { source: SourceKind::Reranked, ..r })
            .collect();
        out.extend_from_slice(tail);
        Some(out)
    }
}
