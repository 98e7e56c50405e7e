#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use surveydb_core::chunker::{Chunker, ChunkingConfig};
use surveydb_core::config::{Bm25Settings, RetrievalSettings};
use surveydb_core::error::{Error, Result};
use surveydb_core::traits::{EmbeddingProvider, Reranker};
use surveydb_core::types::{DocType, Document, RankedResult, RerankCandidate, SourceKind, SurveyType};
use surveydb_embed::HashingEmbedder;
use surveydb_hybrid::{refresh_keyword_index, HybridRetriever, IndexBuilder};
use surveydb_text::KeywordIndex;
use surveydb_vector::LanceVectorIndex;
use tempfile::TempDir;

pub const DIM: usize = 64;

/// Repeat `sentence` and cut at exactly `len` ASCII characters.
pub fn fixed_len(sentence: &str, len: usize) -> String {
    sentence.repeat(len / sentence.len() + 1)[..len].to_string()
}

pub fn kenya_doc() -> Document {
    Document {
        doc_id: "kenya-endline".into(),
        country: "Kenya".into(),
        phase: Some(1),
        survey_type: Some(SurveyType::Endline),
        doc_type: DocType::FullReport,
        year: Some(2017),
        title: "Kenya endline survey report".into(),
        include: true,
        markdown_path: Some("kenya.md".into()),
        online_url: Some("https://example.org/kenya.pdf".into()),
    }
}

pub fn tanzania_doc() -> Document {
    Document {
        doc_id: "tanzania-baseline".into(),
        country: "Tanzania".into(),
        phase: Some(1),
        survey_type: Some(SurveyType::Baseline),
        doc_type: DocType::FullReport,
        year: Some(2013),
        title: "Tanzania baseline survey report".into(),
        include: true,
        markdown_path: Some("tanzania.md".into()),
        online_url: None,
    }
}

/// 300 characters with 120/20 chunking gives exactly three chunks.
pub fn kenya_text() -> String {
    fixed_len("Kenya endline survey: stunting prevalence among children under five in the ZOI declined. ", 300)
}

pub fn tanzania_text() -> String {
    fixed_len("Tanzania baseline: women empowerment in agriculture and dietary diversity of households. ", 300)
}

pub fn chunker() -> Chunker {
    Chunker::new(ChunkingConfig { chunk_size: 120, overlap: 20 }).expect("chunker")
}

pub struct Fixture {
    pub _tmp: TempDir,
    pub embedder: Arc<HashingEmbedder>,
    pub vector: Arc<LanceVectorIndex>,
    pub keyword: Arc<KeywordIndex>,
    pub builder: IndexBuilder,
}

impl Fixture {
    pub async fn new() -> anyhow::Result<Self> {
        let tmp = TempDir::new()?;
        let embedder = Arc::new(HashingEmbedder::new(DIM)?);
        let vector = Arc::new(LanceVectorIndex::open(&tmp.path().join("lancedb"), "chunks", DIM).await?);
        let keyword = Arc::new(KeywordIndex::new(Bm25Settings::default())?);
        let builder = IndexBuilder::new(chunker(), embedder.clone(), vector.clone(), 2)?
            .with_retry(2, Duration::from_millis(1));
        Ok(Self { _tmp: tmp, embedder, vector, keyword, builder })
    }

    /// Both reports ingested and the keyword index built.
    pub async fn loaded() -> anyhow::Result<Self> {
        let fx = Self::new().await?;
        fx.builder.ingest_document(&kenya_doc(), &kenya_text()).await?;
        fx.builder.ingest_document(&tanzania_doc(), &tanzania_text()).await?;
        fx.refresh().await?;
        Ok(fx)
    }

    pub async fn refresh(&self) -> anyhow::Result<usize> {
        Ok(refresh_keyword_index(self.vector.as_ref(), &self.keyword).await?)
    }

    pub fn retriever(&self, settings: RetrievalSettings) -> HybridRetriever {
        self.retriever_with(self.embedder.clone(), settings)
    }

    pub fn retriever_with(&self, embedder: Arc<dyn EmbeddingProvider>, settings: RetrievalSettings) -> HybridRetriever {
        HybridRetriever::new(embedder, self.vector.clone(), self.keyword.clone(), settings).expect("retriever")
    }
}

/// Always fails, as an unreachable embedding service would.
pub struct FailingEmbedder {
    pub retryable: bool,
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn embedder_id(&self) -> &str {
        "failing"
    }
    fn dimension(&self) -> usize {
        DIM
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::embedding("connection refused", self.retryable))
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::embedding("connection refused", self.retryable))
    }
}

/// Answers correctly but only after `delay`.
pub struct SlowEmbedder {
    pub inner: HashingEmbedder,
    pub delay: Duration,
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn embedder_id(&self) -> &str {
        "slow"
    }
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.inner.embed_text(text))
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(self.delay).await;
        Ok(texts.iter().map(|t| self.inner.embed_text(t)).collect())
    }
}

/// Fails with a retryable error `failures` times, then delegates to hashing.
pub struct FlakyEmbedder {
    pub inner: HashingEmbedder,
    pub failures: std::sync::atomic::AtomicU32,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn embedder_id(&self) -> &str {
        "flaky"
    }
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.inner.embed_text(text))
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use std::sync::atomic::Ordering;
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::embedding("503 service unavailable", true));
        }
        Ok(texts.iter().map(|t| self.inner.embed_text(t)).collect())
    }
}

pub enum RerankMode {
    Reverse,
    Fail,
    DropLast,
}

pub struct MockReranker(pub RerankMode);

#[async_trait]
impl Reranker for MockReranker {
    async fn rerank(&self, _query: &str, candidates: &[RerankCandidate]) -> Result<Vec<RankedResult>> {
        let mut out: Vec<RankedResult> = candidates
            .iter()
            .rev()
            .enumerate()
            .map(|(i, c)| RankedResult { chunk_id: c.chunk_id.clone(), score: 1.0 / (i as f32 + 1.0), source: SourceKind::Reranked })
            .collect();
        match self.0 {
            RerankMode::Reverse => Ok(out),
            RerankMode::Fail => Err(Error::Rerank("model crashed".into())),
            RerankMode::DropLast => {
                out.pop();
                Ok(out)
            }
        }
    }
}
