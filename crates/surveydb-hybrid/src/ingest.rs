//! Catalog-driven ingestion: chunk, embed, and atomically replace each
//! document in the vector store, then rebuild the keyword index from it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use surveydb_core::chunker::{fingerprint_chunks, Chunker};
use surveydb_core::config::resolve_with_base;
use surveydb_core::error::{Error, Result};
use surveydb_core::traits::{EmbeddingProvider, VectorIndex};
use surveydb_core::types::{Chunk, Document};
use surveydb_text::KeywordIndex;

#[derive(Debug, Deserialize)]
struct Catalog {
    documents: Vec<Document>,
}

/// Read `metadata.json` (`{"documents": [...]}`).
pub fn load_catalog(path: &Path) -> Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path)?;
    let catalog: Catalog = serde_json::from_str(&raw)?;
    Ok(catalog.documents)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Indexed { chunks: usize },
    /// Same fingerprint as the stored chunk set; nothing was embedded.
    Unchanged,
    Excluded,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub indexed: usize,
    pub unchanged: usize,
    pub excluded: usize,
    pub failed: usize,
    pub chunks_written: usize,
    /// `(doc_id, error)` for every failed document.
    pub failures: Vec<(String, String)>,
}

pub struct IndexBuilder {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    vector: Arc<dyn VectorIndex>,
    batch_size: usize,
    max_retries: u32,
    retry_delay: Duration,
}

impl IndexBuilder {
    pub fn new(chunker: Chunker, embedder: Arc<dyn EmbeddingProvider>, vector: Arc<dyn VectorIndex>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("embed batch size must be > 0".into()));
        }
        Ok(Self { chunker, embedder, vector, batch_size, max_retries: 2, retry_delay: Duration::from_millis(500) })
    }

    /// Retry policy for retryable embedding errors; the delay doubles per attempt.
    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Index one document. Nothing is written unless every chunk embedded.
    pub async fn ingest_document(&self, doc: &Document, text: &str) -> Result<IngestOutcome> {
        if !doc.include {
            self.vector.delete_by_doc_id(&doc.doc_id).await?;
            debug!(doc_id = %doc.doc_id, "excluded document removed from index");
            return Ok(IngestOutcome::Excluded);
        }
        let mut chunks = self.chunker.chunk_document(&doc.metadata(), text);
        let fingerprint = fingerprint_chunks(&chunks);
        if self.vector.document_fingerprint(&doc.doc_id).await?.as_deref() == Some(fingerprint.as_str()) {
            debug!(doc_id = %doc.doc_id, "document unchanged");
            return Ok(IngestOutcome::Unchanged);
        }
        self.embed_chunks(&mut chunks).await?;
        self.vector.replace_document(&doc.doc_id, &chunks).await?;
        info!(doc_id = %doc.doc_id, chunks = chunks.len(), "document indexed");
        Ok(IngestOutcome::Indexed { chunks: chunks.len() })
    }

    /// Ingest every catalog entry; one document failing does not stop the rest.
    pub async fn ingest_catalog(&self, docs: &[Document], markdown_root: &Path) -> IngestReport {
        let mut report = IngestReport::default();
        let pb = ProgressBar::new(docs.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        for doc in docs {
            pb.set_message(doc.doc_id.clone());
            match self.ingest_from_disk(doc, markdown_root).await {
                Ok(IngestOutcome::Indexed { chunks }) => {
                    report.indexed += 1;
                    report.chunks_written += chunks;
                }
                Ok(IngestOutcome::Unchanged) => report.unchanged += 1,
                Ok(IngestOutcome::Excluded) => report.excluded += 1,
                Err(e) => {
                    warn!(doc_id = %doc.doc_id, error = %e, "document failed to ingest");
                    report.failed += 1;
                    report.failures.push((doc.doc_id.clone(), e.to_string()));
                }
            }
            pb.inc(1);
        }
        pb.finish_with_message("done");
        info!(
            indexed = report.indexed,
            unchanged = report.unchanged,
            excluded = report.excluded,
            failed = report.failed,
            chunks = report.chunks_written,
            "ingestion finished"
        );
        report
    }

    async fn ingest_from_disk(&self, doc: &Document, markdown_root: &Path) -> Result<IngestOutcome> {
        if !doc.include {
            return self.ingest_document(doc, "").await;
        }
        let rel = doc
            .markdown_path
            .as_deref()
            .ok_or_else(|| Error::NotFound(format!("document {} has no markdown_path", doc.doc_id)))?;
        let path = resolve_with_base(markdown_root, rel);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| Error::NotFound(format!("{}: {e}", path.display())))?;
        self.ingest_document(doc, &text).await
    }

    async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<()> {
        let dim = self.embedder.dimension();
        for batch in chunks.chunks_mut(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embed_with_retry(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::embedding(format!("expected {} embeddings, got {}", batch.len(), vectors.len()), false));
            }
            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                if vector.len() != dim {
                    return Err(Error::DimensionMismatch { provider: vector.len(), stored: dim });
                }
                chunk.embedding = Some(vector);
            }
        }
        Ok(())
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        loop {
            match self.embedder.embed_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_delay * 2u32.pow(attempt);
                    warn!(attempt = attempt + 1, max = self.max_retries + 1, ?delay, error = %e, "embedding failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Rebuild BM25 statistics from everything in the vector store.
pub async fn refresh_keyword_index(vector: &dyn VectorIndex, keyword: &KeywordIndex) -> Result<usize> {
    let chunks = vector.all_chunks().await?;
    let n = chunks.len();
    keyword.rebuild(chunks);
    info!(chunks = n, "keyword index refreshed");
    Ok(n)
}
