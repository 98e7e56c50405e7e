//! surveydb-embed
//!
//! Embedding providers (local candle model, Ollama, feature hashing) and the
//! candle cross-encoder reranker. Backends are picked once from configuration.
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use surveydb_core::config::{expand_path, EmbeddingBackend, EmbeddingSettings, RerankerSettings};
use surveydb_core::error::{Error, Result};
use surveydb_core::traits::{EmbeddingProvider, Reranker};

pub mod device;
pub mod hashing;
pub mod local;
pub mod model;
pub mod ollama;
pub mod pool;
pub mod rerank;
pub mod tokenize;

pub use hashing::HashingEmbedder;
pub use local::{EmbeddingModel, LocalEmbedder};
pub use ollama::OllamaEmbedder;
pub use pool::masked_mean_l2;
pub use rerank::CrossEncoderReranker;

pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match settings.provider {
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(settings.dimensions)?),
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(
            &settings.ollama_base_url,
            &settings.ollama_model,
            settings.dimensions,
            Duration::from_secs(settings.request_timeout_secs),
        )?),
        EmbeddingBackend::Local => {
            let dir = expand_path(&settings.model_dir);
            let local = LocalEmbedder::load(&dir, settings.max_len)
                .map_err(|e| Error::InvalidConfig(format!("local embedding model at {}: {e}", dir.display())))?;
            if local.dimension() != settings.dimensions {
                return Err(Error::InvalidConfig(format!(
                    "embeddings.dimensions = {} but model at {} produces {}",
                    settings.dimensions,
                    dir.display(),
                    local.dimension()
                )));
            }
            Arc::new(local)
        }
    };
    info!(embedder = embedder.embedder_id(), "embedding provider ready");
    Ok(embedder)
}

pub fn build_reranker(settings: &RerankerSettings) -> Result<Arc<dyn Reranker>> {
    let dir = expand_path(&settings.model_dir);
    let reranker = CrossEncoderReranker::load(&dir, settings.max_len)
        .map_err(|e| Error::InvalidConfig(format!("reranker model at {}: {e}", dir.display())))?;
    Ok(Arc::new(reranker))
}
