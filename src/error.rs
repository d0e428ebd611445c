//! Error taxonomy for the retrieval engine.
//!
//! Each component owns one error enum so callers can tell input problems
//! (bad file, empty document) apart from transport failures (embedding
//! service), consistency violations (dimension or count mismatches), and
//! storage failures. The CLI collapses all of them into `anyhow::Error`.

use std::path::PathBuf;

/// Failure while turning a source file into plain text.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("EPUB extraction failed: {0}")]
    Epub(String),
    #[error("XML extraction failed: {0}")]
    Xml(String),
}

/// Failure while computing embeddings.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed embedding response: {0}")]
    Decode(String),
    #[error("embedding response contained no vectors")]
    EmptyResponse,
    #[error("embedding index {index} out of range for {len} inputs")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("embedding index {0} returned more than once")]
    DuplicateIndex(usize),
    #[error("embedding service returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
    #[error("embedding request timed out")]
    Timeout,
    #[error("embedding cancelled")]
    Cancelled,
    #[error("local embedding failed: {0}")]
    Local(String),
}

/// Failure inside the vector store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no partition for vectors of dimension {0}")]
    NoPartition(usize),
    #[error("stored vector is corrupt: {0}")]
    CorruptVector(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("delete failed in {} partition(s): {}", .0.len(), join_failures(.0))]
    PartialDelete(Vec<(usize, String)>),
}

fn join_failures(failures: &[(usize, String)]) -> String {
    failures
        .iter()
        .map(|(dims, err)| format!("vectors_{}: {}", dims, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure while ingesting a document.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("document {0} produced no paragraphs")]
    EmptyDocument(String),
    #[error("batch {batch}: {source}")]
    Embed {
        batch: usize,
        #[source]
        source: EmbedError,
    },
    #[error("batch {batch}: got {vectors} embeddings for {paragraphs} paragraphs")]
    Misaligned {
        batch: usize,
        paragraphs: usize,
        vectors: usize,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("ingestion timed out after {0}s")]
    Timeout(u64),
    #[error("ingestion cancelled")]
    Cancelled,
    #[error("ingestion worker failed: {0}")]
    Worker(String),
}

/// Failure while answering a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("every query variation failed; last error: {0}")]
    AllVariationsFailed(String),
}
