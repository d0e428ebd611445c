//! Core data models used throughout the engine.
//!
//! These types represent the documents, paragraphs, stored vectors, and
//! search results that flow through ingestion and retrieval.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::ExtractError;

/// Source formats the extractor understands, inferred from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Markdown,
    Html,
    Epub,
    Pdf,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "text" | "log" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" | "xhtml" => Some(Self::Html),
            "epub" => Some(Self::Epub),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// A file being ingested. Exists only for the duration of one load.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub format: DocumentFormat,
}

impl Document {
    /// Fails with [`ExtractError::UnsupportedFormat`] for unknown extensions.
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let format = DocumentFormat::from_path(path).ok_or_else(|| {
            ExtractError::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("<none>")
                    .to_string(),
            )
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
        })
    }
}

/// A word-bounded span of source text; the unit that gets embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub index: usize,
    pub text: String,
    pub word_count: usize,
}

/// The persisted unit. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub slug: String,
    pub raw_text: String,
    pub source_filename: String,
    pub created_at: DateTime<Utc>,
}

impl VectorRecord {
    pub fn new(
        embedding: Vec<f32>,
        slug: impl Into<String>,
        raw_text: impl Into<String>,
        source_filename: impl Into<String>,
    ) -> Self {
        Self {
            embedding,
            slug: slug.into(),
            raw_text: raw_text.into(),
            source_filename: source_filename.into(),
            created_at: Utc::now(),
        }
    }
}

/// A stored record scored against one query vector.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub record: VectorRecord,
    /// `1 - cosine_similarity`, lower is closer. After reranking this holds
    /// the adjusted distance.
    pub distance: f32,
}

/// Deterministic record identifier: `"{filename}_{batch}_{position}"`.
pub fn make_slug(filename: &str, batch: usize, position: usize) -> String {
    format!("{}_{}_{}", filename, batch, position)
}
