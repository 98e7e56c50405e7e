use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use candle_core::Device;
use candle_transformers::models::xlm_roberta::XLMRobertaModel;
use tokenizers::Tokenizer;
use tracing::{info, warn};

use surveydb_core::error::{Error, Result as CoreResult};
use surveydb_core::traits::EmbeddingProvider;

use crate::device::select_device;
use crate::model::{load_model_files, token_types, var_builder};
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

/// BGE-M3 style sentence encoder: XLM-RoBERTa + masked mean pooling + L2 norm.
pub struct EmbeddingModel { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device, dim: usize, max_len: usize }

impl EmbeddingModel {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        let files = load_model_files(model_dir, &device)?;
        let dim = files.config.hidden_size;
        let model = XLMRobertaModel::new(&files.config, var_builder(files.weights, &device))?;
        info!(dim, max_len, "embedding model ready");
        Ok(Self { model, tokenizer: files.tokenizer, device, dim, max_len })
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = token_types(&input_ids)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        if rows.len() != texts.len() || rows.iter().any(|r| r.len() != self.dim) {
            return Err(anyhow!("model returned {} rows for {} inputs", rows.len(), texts.len()));
        }
        let elapsed = start.elapsed().as_millis();
        if elapsed > 100 * texts.len() as u128 { warn!(batch = texts.len(), elapsed_ms = elapsed as u64, "slow embedding batch"); }
        Ok(rows)
    }
}

/// [`EmbeddingProvider`] over a local candle model; inference runs on the blocking pool.
pub struct LocalEmbedder { model: Arc<EmbeddingModel>, id: String }

impl LocalEmbedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let model = EmbeddingModel::load(model_dir, max_len)?;
        let name = model_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "local".into());
        let id = format!("local:{}:d{}", name, model.dim());
        Ok(Self { model: Arc::new(model), id })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    fn dimension(&self) -> usize { self.model.dim() }

    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let mut rows = self.embed_batch(&[text.to_string()]).await?;
        rows.pop().ok_or_else(|| Error::embedding("model returned no vector", false))
    }

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.embed_texts(&texts))
            .await
            .map_err(|e| Error::embedding(format!("embedding task failed: {e}"), false))?
            .map_err(|e| Error::embedding(e.to_string(), false))
    }
}
