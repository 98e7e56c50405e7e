use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use surveydb_core::error::{Error, Result};
use surveydb_core::traits::EmbeddingProvider;

/// Remote embeddings from an Ollama server (`POST /api/embed`).
pub struct OllamaEmbedder {
    client: Client,
    url: String,
    model: String,
    dim: usize,
    id: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, dim: usize, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dim,
            id: format!("ollama:{model}:d{dim}"),
        })
    }
}

/// Connection failures, timeouts and 5xx may succeed on retry; anything else will not.
fn request_error(err: reqwest::Error) -> Error {
    let retryable = err.is_timeout() || err.is_connect() || err.status().is_some_and(|s| s.is_server_error());
    Error::embedding(format!("Embedding request failed: {err}"), retryable)
}

fn status_error(status: StatusCode, body: &str) -> Error {
    Error::embedding(format!("Embedding failed: HTTP {status}: {body}"), status.is_server_error())
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    fn dimension(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut rows = self.embed_batch(&[text.to_string()]).await?;
        rows.pop().ok_or_else(|| Error::embedding("Ollama returned no embedding", false))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let response = self
            .client
            .post(&self.url)
            .json(&EmbedRequest { model: &self.model, input: texts })
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        let parsed: EmbedResponse = response.json().await.map_err(request_error)?;
        if parsed.embeddings.len() != texts.len() {
            return Err(Error::embedding(
                format!("Ollama returned {} embeddings for {} inputs", parsed.embeddings.len(), texts.len()),
                false,
            ));
        }
        if let Some(bad) = parsed.embeddings.iter().find(|v| v.len() != self.dim) {
            return Err(Error::DimensionMismatch { provider: bad.len(), stored: self.dim });
        }
        debug!(batch = texts.len(), model = %self.model, "ollama embeddings");
        Ok(parsed.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
        assert!(!status_error(StatusCode::NOT_FOUND, "model not found").is_retryable());
    }

    #[tokio::test]
    async fn unreachable_server_is_retryable() {
        let embedder = OllamaEmbedder::new("http://127.0.0.1:9", "nomic-embed-text", 768, Duration::from_millis(500)).expect("client");
        let err = embedder.embed("stunting").await.expect_err("no server");
        assert!(err.is_retryable(), "connection refused should be retryable: {err}");
    }
}
