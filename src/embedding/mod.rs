//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and its variants:
//! - **[`DisabledEmbedder`]**: returns [`EmbedError::Disabled`]; used when
//!   embeddings are not configured.
//! - **[`HttpEmbedder`]**: POSTs to an OpenAI- or Ollama-compatible
//!   embeddings endpoint. The production implementation.
//! - **`LocalEmbedder`**: runs a model in-process via fastembed (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the appropriate variant:
//!
//! ```rust,no_run
//! # use chat_rag::config::EmbeddingConfig;
//! # use chat_rag::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```
//!
//! No variant retries. A failed call is reported once and the caller
//! decides what to do with it.

mod http;
#[cfg(feature = "local-embeddings-fastembed")]
mod local;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

pub use http::HttpEmbedder;
#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

/// Turns text into fixed-length vectors.
///
/// `embed_batch` must return exactly one vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbedError::CountMismatch {
                expected: 1,
                got: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }
}

/// [`Embedder::embed_batch`], abandoned with [`EmbedError::Cancelled`] as
/// soon as `cancel` fires.
pub async fn embed_batch_with_cancel(
    embedder: &dyn Embedder,
    texts: &[String],
    cancel: &CancelToken,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if cancel.is_cancelled() {
        return Err(EmbedError::Cancelled);
    }
    tokio::select! {
        res = embedder.embed_batch(texts) => res,
        _ = cancel.cancelled() => Err(EmbedError::Cancelled),
    }
}

// ============ Disabled ============

/// An embedder that always fails with [`EmbedError::Disabled`].
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Variant |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`HttpEmbedder`] |
/// | `"ollama"` | [`HttpEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" | "ollama" => Ok(Arc::new(HttpEmbedder::from_config(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::from_config(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
