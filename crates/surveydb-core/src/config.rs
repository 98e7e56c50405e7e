//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`APP_RETRIEVAL__K_FINAL=8` sets `retrieval.k_final`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Build from an explicit figment (defaults are merged underneath).
    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(figment);
        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment.extract().map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let settings = self.settings()?;
        settings.validate()?;
        if matches!(env, "prod" | "production") && settings.embeddings.provider == EmbeddingBackend::Hashing {
            anyhow::bail!("embeddings.provider = \"hashing\" is for development only");
        }
        Ok(())
    }
}

/// Typed view over every configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalSettings,
    pub bm25: Bm25Settings,
    pub embeddings: EmbeddingSettings,
    pub reranker: RerankerSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.bm25.validate()?;
        if self.embeddings.dimensions == 0 {
            return Err(Error::InvalidConfig("embeddings.dimensions must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Catalog of documents (`{"documents": [...]}`).
    pub metadata_path: String,
    /// Base directory that `Document::markdown_path` is relative to.
    pub markdown_root: String,
    pub lancedb_dir: String,
    pub table: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            metadata_path: "data/processed/metadata.json".into(),
            markdown_root: ".".into(),
            lancedb_dir: "data/indexes/lancedb".into(),
            table: "chunks".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// RRF smoothing term `k` in `1 / (k + rank)`.
    pub rank_constant: f32,
    /// Candidates taken from each branch before fusion.
    pub k_candidates: usize,
    pub k_final: usize,
    pub enable_reranker: bool,
    pub k_rerank_input: usize,
    pub embed_timeout_ms: u64,
    pub embed_batch_size: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            rank_constant: 60.0,
            k_candidates: 12,
            k_final: 5,
            enable_reranker: false,
            k_rerank_input: 20,
            embed_timeout_ms: 10_000,
            embed_batch_size: 50,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.rank_constant > 0.0) {
            return Err(Error::InvalidConfig("retrieval.rank_constant must be > 0".into()));
        }
        if self.k_candidates == 0 || self.k_rerank_input == 0 || self.embed_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "retrieval.k_candidates, k_rerank_input and embed_batch_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Settings {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Settings {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl Bm25Settings {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.k1 >= 0.0) || !(0.0..=1.0).contains(&self.b) {
            return Err(Error::InvalidConfig(format!(
                "bm25 requires k1 >= 0 and 0 <= b <= 1 (got k1={}, b={})",
                self.k1, self.b
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    Ollama,
    Local,
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingBackend,
    pub dimensions: usize,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub request_timeout_secs: u64,
    /// Directory holding `tokenizer.json`, `config.json` and weights for `local`.
    pub model_dir: String,
    pub max_len: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Ollama,
            dimensions: 768,
            ollama_base_url: "http://localhost:11434".into(),
            ollama_model: "nomic-embed-text".into(),
            request_timeout_secs: 30,
            model_dir: "models/bge-m3".into(),
            max_len: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub model_dir: String,
    pub max_len: usize,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self { model_dir: "models/bge-reranker-base".into(), max_len: 512 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
