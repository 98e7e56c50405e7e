use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    /// The embedding backend failed for a whole call. `retryable` marks
    /// transient conditions (timeouts, connection errors, 5xx).
    #[error("Embedding backend error: {message}")]
    Embedding { message: String, retryable: bool },

    #[error("Embedding dimension mismatch: provider yields {provider}, index stores {stored}")]
    DimensionMismatch { provider: usize, stored: usize },

    #[error("Keyword index is not ready (no build has completed)")]
    NotReady,

    #[error("Vector store error: {0}")]
    Storage(String),

    #[error("Reranker error: {0}")]
    Rerank(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn embedding(message: impl Into<String>, retryable: bool) -> Self {
        Self::Embedding { message: message.into(), retryable }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Embedding { retryable: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
