use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the environment variable holding the bearer credential.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: None,
            model: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Resolve the bearer credential, if one is configured and present.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_word_limit")]
    pub word_limit: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_status_capacity")]
    pub status_capacity: usize,
    /// Upper bound on one whole ingestion. 0 disables the limit.
    #[serde(default = "default_ingest_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            word_limit: default_word_limit(),
            batch_size: default_batch_size(),
            workers: default_workers(),
            status_capacity: default_status_capacity(),
            timeout_secs: default_ingest_timeout_secs(),
        }
    }
}

fn default_word_limit() -> usize {
    120
}
fn default_batch_size() -> usize {
    16
}
fn default_workers() -> usize {
    4
}
fn default_status_capacity() -> usize {
    64
}
fn default_ingest_timeout_secs() -> u64 {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Results returned by a raw vector lookup (`RagEngine::nearest`).
    #[serde(default = "default_store_k")]
    pub store_k: usize,
    /// Results fetched per query variation.
    #[serde(default = "default_per_query_k")]
    pub per_query_k: usize,
    /// Hard cap on merged, reranked results.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            store_k: default_store_k(),
            per_query_k: default_per_query_k(),
            max_results: default_max_results(),
            default_limit: default_limit(),
        }
    }
}

fn default_store_k() -> usize {
    crate::store::DEFAULT_K
}
fn default_per_query_k() -> usize {
    5
}
fn default_max_results() -> usize {
    10
}
fn default_limit() -> usize {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate ingestion
    if config.ingest.word_limit == 0 {
        anyhow::bail!("ingest.word_limit must be > 0");
    }
    if config.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be > 0");
    }
    if config.ingest.workers == 0 {
        anyhow::bail!("ingest.workers must be > 0");
    }
    if config.ingest.status_capacity == 0 {
        anyhow::bail!("ingest.status_capacity must be > 0");
    }

    // Validate retrieval
    if config.retrieval.store_k == 0 || config.retrieval.per_query_k == 0 {
        anyhow::bail!("retrieval.store_k and retrieval.per_query_k must be > 0");
    }
    if config.retrieval.max_results == 0 {
        anyhow::bail!("retrieval.max_results must be > 0");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {
            if config.embedding.url.is_none() {
                anyhow::bail!(
                    "embedding.url must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        "disabled" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}
