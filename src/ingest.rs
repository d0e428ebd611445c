//! Ingestion pipeline orchestration.
//!
//! Drives one document from path to stored vectors:
//!
//! ```text
//! extract → segment → batches ──queue──▶ N embedding workers ──▶ writer → store
//! ```
//!
//! - Batches go through a bounded MPMC queue (`async-channel`), so at most
//!   `workers` batches are waiting at any time.
//! - Each worker embeds whole batches; a batch's vectors stay aligned with
//!   its paragraphs.
//! - The calling task is the only writer. Slugs are
//!   `"{filename}_{batch}_{position}"`, both zero-based, so re-ingesting the
//!   same file yields the same identifiers regardless of completion order.
//! - The first failure aborts everything still in flight. Batches already
//!   written stay written.
//!
//! Status strings go through a [`StatusSender`], which never blocks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::cancel::CancelToken;
use crate::config::IngestConfig;
use crate::embedding::{embed_batch_with_cancel, Embedder};
use crate::error::{EmbedError, IngestError};
use crate::extract::extract_text;
use crate::models::{make_slug, TextUnit, VectorRecord};
use crate::progress::StatusSender;
use crate::segment::segment;
use crate::store::VectorStore;

/// Summary of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub filename: String,
    pub paragraphs: usize,
    pub batches: usize,
    pub records_written: usize,
}

struct BatchJob {
    batch: usize,
    texts: Vec<String>,
}

struct BatchResult {
    batch: usize,
    texts: Vec<String>,
    vectors: Result<Vec<Vec<f32>>, EmbedError>,
}

/// The filename component used for slugs and `list_files`.
pub fn source_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Ingest the file at `path`.
///
/// Publishes `loading <file>` first, then progress, then either
/// `loaded file <file>` followed by `finished`, or `failed: <reason>`.
/// Bounded by `config.timeout_secs` (0 disables the limit) and by `cancel`.
pub async fn ingest_document(
    path: &Path,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: &IngestConfig,
    status: &StatusSender,
    cancel: &CancelToken,
) -> Result<IngestReport, IngestError> {
    let filename = source_filename(path);
    status.loading(&filename);
    tracing::info!(file = %path.display(), "ingestion started");

    let pipeline = run_pipeline(
        path.to_path_buf(),
        filename.clone(),
        embedder,
        store,
        config,
        status,
        cancel,
    );

    let outcome = tokio::select! {
        res = with_timeout(config.timeout_secs, pipeline) => res,
        _ = cancel.cancelled() => Err(IngestError::Cancelled),
    };

    match &outcome {
        Ok(report) => {
            status.loaded(&filename);
            status.finished();
            tracing::info!(
                file = %filename,
                paragraphs = report.paragraphs,
                batches = report.batches,
                records = report.records_written,
                "ingestion finished"
            );
        }
        Err(e) => {
            status.failed(e);
            tracing::error!(file = %filename, error = %e, "ingestion failed");
        }
    }
    outcome
}

async fn with_timeout<F>(secs: u64, fut: F) -> Result<IngestReport, IngestError>
where
    F: std::future::Future<Output = Result<IngestReport, IngestError>>,
{
    if secs == 0 {
        return fut.await;
    }
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .unwrap_or(Err(IngestError::Timeout(secs)))
}

async fn run_pipeline(
    path: PathBuf,
    filename: String,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: &IngestConfig,
    status: &StatusSender,
    cancel: &CancelToken,
) -> Result<IngestReport, IngestError> {
    let text = tokio::task::spawn_blocking(move || extract_text(&path))
        .await
        .map_err(|e| IngestError::Worker(e.to_string()))??;

    let units = segment(&text, config.word_limit);
    if units.is_empty() {
        return Err(IngestError::EmptyDocument(filename));
    }

    let batches = into_batches(units, config.batch_size);
    let total = batches.len();
    let paragraphs: usize = batches.iter().map(Vec::len).sum();
    status.send(format!("{} paragraphs in {} batches", paragraphs, total));
    tracing::debug!(file = %filename, paragraphs, batches = total, "document segmented");

    let workers = config.workers.clamp(1, total);
    let (job_tx, job_rx) = async_channel::bounded::<BatchJob>(workers);
    let (result_tx, mut result_rx) = mpsc::channel::<BatchResult>(workers);

    // Dropping the set aborts every task, so an early return below also
    // stops the feeder and any in-flight embedding call.
    let mut tasks = JoinSet::new();

    tasks.spawn(async move {
        for (batch, texts) in batches.into_iter().enumerate() {
            if job_tx.send(BatchJob { batch, texts }).await.is_err() {
                break;
            }
        }
    });

    for _ in 0..workers {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let embedder = Arc::clone(&embedder);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            while let Ok(job) = job_rx.recv().await {
                let vectors =
                    embed_batch_with_cancel(embedder.as_ref(), &job.texts, &cancel).await;
                let result = BatchResult {
                    batch: job.batch,
                    texts: job.texts,
                    vectors,
                };
                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(job_rx);
    drop(result_tx);

    let mut records_written = 0usize;
    for done in 1..=total {
        let Some(result) = result_rx.recv().await else {
            return Err(IngestError::Worker(format!(
                "embedding workers exited after {} of {} batches",
                done - 1,
                total
            )));
        };
        let records = build_records(&filename, result)?;
        store.write_batch(&records).await?;
        records_written += records.len();
        status.send(format!("stored batch {}/{}", done, total));
    }

    Ok(IngestReport {
        filename,
        paragraphs,
        batches: total,
        records_written,
    })
}

fn into_batches(units: Vec<TextUnit>, batch_size: usize) -> Vec<Vec<String>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(units.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size);
    for unit in units {
        current.push(unit.text);
        if current.len() == batch_size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(batch_size)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn build_records(filename: &str, result: BatchResult) -> Result<Vec<VectorRecord>, IngestError> {
    let BatchResult {
        batch,
        texts,
        vectors,
    } = result;
    let vectors = vectors.map_err(|source| match source {
        EmbedError::Cancelled => IngestError::Cancelled,
        source => IngestError::Embed { batch, source },
    })?;
    if vectors.len() != texts.len() {
        return Err(IngestError::Misaligned {
            batch,
            paragraphs: texts.len(),
            vectors: vectors.len(),
        });
    }
    tracing::debug!(batch, paragraphs = texts.len(), "batch embedded");

    Ok(texts
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(pos, (text, embedding))| {
            VectorRecord::new(embedding, make_slug(filename, batch, pos), text, filename)
        })
        .collect())
}
