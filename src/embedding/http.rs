//! HTTP embedding client for OpenAI- and Ollama-compatible endpoints.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// Embedding client that POSTs `{ "model", "input" }` to one endpoint.
///
/// The bearer credential, when present, is baked into the client's default
/// headers. Every request is bounded by the client timeout. There are no
/// retries.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let model = model.into();
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        let endpoint = endpoint.into();
        anyhow::ensure!(!endpoint.trim().is_empty(), "missing embedding endpoint URL");

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let auth = format!("Bearer {}", key.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth).context("invalid embedding API key")?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            model,
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.url required for {} provider", config.provider))?;
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", config.provider))?;
        Self::new(
            url,
            model,
            config.api_key(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let vectors = parse_response(&body, texts.len())?;
        tracing::trace!(inputs = texts.len(), model = %self.model, "embedded batch");
        Ok(vectors)
    }
}

fn transport_error(err: reqwest::Error) -> EmbedError {
    if err.is_timeout() {
        EmbedError::Timeout
    } else {
        EmbedError::Transport(err)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    /// `{ "data": [ { "embedding": [..], "index": n } ] }`
    Indexed { data: Vec<EmbeddingData> },
    /// `{ "embeddings": [[..], ..] }`
    Positional { embeddings: Vec<Vec<f32>> },
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Decode a response body into exactly `expected` vectors in input order.
fn parse_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    let parsed: EmbeddingResponse =
        serde_json::from_str(body).map_err(|e| EmbedError::Decode(e.to_string()))?;

    let vectors = match parsed {
        EmbeddingResponse::Positional { embeddings } => embeddings,
        EmbeddingResponse::Indexed { data } => reorder_by_index(data, expected)?,
    };

    if vectors.is_empty() {
        return Err(EmbedError::EmptyResponse);
    }
    if vectors.len() != expected {
        return Err(EmbedError::CountMismatch {
            expected,
            got: vectors.len(),
        });
    }
    Ok(vectors)
}

/// Place each entry at its `index` slot. Entries without an index keep
/// response order; a mix of the two is rejected.
fn reorder_by_index(data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    let indexed = data.iter().filter(|d| d.index.is_some()).count();
    if indexed == 0 {
        return Ok(data.into_iter().map(|d| d.embedding).collect());
    }
    if indexed != data.len() {
        return Err(EmbedError::Decode(
            "some embeddings carry an index and some do not".to_string(),
        ));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for entry in data {
        let index = entry.index.unwrap_or_default();
        let slot = slots.get_mut(index).ok_or(EmbedError::IndexOutOfRange {
            index,
            len: expected,
        })?;
        if slot.is_some() {
            return Err(EmbedError::DuplicateIndex(index));
        }
        *slot = Some(entry.embedding);
    }

    let filled: Vec<Vec<f32>> = slots.into_iter().flatten().collect();
    if filled.len() != expected {
        return Err(EmbedError::CountMismatch {
            expected,
            got: filled.len(),
        });
    }
    Ok(filled)
}
