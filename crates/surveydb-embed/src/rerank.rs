use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use candle_core::Device;
use candle_transformers::models::xlm_roberta::XLMRobertaForSequenceClassification;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use surveydb_core::error::{Error, Result as CoreResult};
use surveydb_core::traits::Reranker;
use surveydb_core::types::{sort_ranked, RankedResult, RerankCandidate, SourceKind};

use crate::device::select_device;
use crate::model::{load_model_files, token_types, var_builder};
use crate::tokenize::tokenize_pair;

struct CrossEncoder { model: XLMRobertaForSequenceClassification, tokenizer: Tokenizer, device: Device, max_len: usize }

impl CrossEncoder {
    /// Relevance in (0, 1): sigmoid of the single classification logit.
    fn score(&self, query: &str, passage: &str) -> Result<f32> {
        let (input_ids, attention_mask) = tokenize_pair(&self.tokenizer, query, passage, self.max_len, &self.device)?;
        let token_type_ids = token_types(&input_ids)?;
        let logits = self.model.forward(&input_ids, &attention_mask, &token_type_ids)?;
        let logit = logits.flatten_all()?.to_vec1::<f32>()?.first().copied().unwrap_or(f32::NEG_INFINITY);
        Ok(1.0 / (1.0 + (-logit).exp()))
    }
}

/// bge-reranker style cross-encoder scoring (query, passage) pairs.
pub struct CrossEncoderReranker { inner: Arc<CrossEncoder> }

impl CrossEncoderReranker {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        let files = load_model_files(model_dir, &device)?;
        let model = XLMRobertaForSequenceClassification::new(1, &files.config, var_builder(files.weights, &device))?;
        info!(dir = %model_dir.display(), max_len, "reranker ready");
        Ok(Self { inner: Arc::new(CrossEncoder { model, tokenizer: files.tokenizer, device, max_len }) })
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate]) -> CoreResult<Vec<RankedResult>> {
        let inner = Arc::clone(&self.inner);
        let query = query.to_string();
        let candidates = candidates.to_vec();
        let mut scored = tokio::task::spawn_blocking(move || -> Result<Vec<RankedResult>> {
            let mut out = Vec::with_capacity(candidates.len());
            for c in &candidates {
                let score = inner.score(&query, &c.text)?;
                out.push(RankedResult { chunk_id: c.chunk_id.clone(), score, source: SourceKind::Reranked });
            }
            Ok(out)
        })
        .await
        .map_err(|e| Error::Rerank(format!("rerank task failed: {e}")))?
        .map_err(|e| Error::Rerank(e.to_string()))?;
        sort_ranked(&mut scored);
        debug!(candidates = scored.len(), "reranked");
        Ok(scored)
    }
}
