//! Implementations behind the `rag` subcommands.
//!
//! Results go to stdout; progress and diagnostics go to stderr.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::engine::RagEngine;
use crate::migrate;
use crate::progress::{status_channel, ProgressMode, StatusSender};

pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("Database initialized at {}.", config.db.path.display());
    Ok(())
}

/// Ingest each path in turn. Continues past failures and reports them at the end.
pub async fn run_load(config: &Config, paths: &[PathBuf], mode: ProgressMode) -> Result<()> {
    let (status, mut rx) = status_channel(config.ingest.status_capacity);
    let reporter = mode.reporter();
    let drain = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            reporter.report(&message);
        }
    });

    let engine = RagEngine::from_config(config.clone(), status).await?;
    let mut failed = 0usize;
    for path in paths {
        match engine.load_document(path).await {
            Ok(report) => println!(
                "Loaded {}: {} paragraphs in {} batches, {} records written.",
                report.filename, report.paragraphs, report.batches, report.records_written
            ),
            Err(e) => {
                failed += 1;
                eprintln!("Error loading {}: {}", path.display(), e);
            }
        }
    }

    // The engine owns the last sender; dropping it ends the drain task.
    drop(engine);
    let _ = drain.await;

    if failed > 0 {
        bail!("{} of {} file(s) failed to load", failed, paths.len());
    }
    Ok(())
}

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    digest: bool,
) -> Result<()> {
    let engine = RagEngine::from_config(config.clone(), StatusSender::disconnected()).await?;
    let limit = limit.unwrap_or(config.retrieval.default_limit);

    if digest {
        let synthesis = engine.synthesize(query, limit).await?;
        print!("{}", synthesis.answer);
        if !synthesis.answer.ends_with('\n') {
            println!();
        }
        return Ok(());
    }

    let results = engine.search(query, limit).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let record = &result.record;
        println!(
            "{}. [{:.3}] {}",
            i + 1,
            result.distance,
            record.source_filename
        );
        println!("    slug: {}", record.slug);
        println!(
            "    loaded: {}",
            record.created_at.format("%Y-%m-%d %H:%M")
        );
        println!(
            "    excerpt: \"{}\"",
            record.raw_text.replace('\n', " ").trim()
        );
        println!();
    }
    Ok(())
}

pub async fn run_files(config: &Config) -> Result<()> {
    let engine = RagEngine::from_config(config.clone(), StatusSender::disconnected()).await?;
    let files = engine.list_loaded_files().await?;
    if files.is_empty() {
        println!("No files loaded.");
    }
    for file in files {
        println!("{}", file);
    }
    Ok(())
}

pub async fn run_remove(config: &Config, filename: &str) -> Result<()> {
    let engine = RagEngine::from_config(config.clone(), StatusSender::disconnected()).await?;
    engine.remove_file(filename).await?;
    println!("Removed {}.", filename);
    Ok(())
}

pub async fn run_embed(config: &Config, text: &str) -> Result<()> {
    let engine = RagEngine::from_config(config.clone(), StatusSender::disconnected()).await?;
    let vector = engine.embed_single(text).await?;
    eprintln!(
        "{} dimensions from {}",
        vector.len(),
        engine.embedder().model_name()
    );
    println!("{}", serde_json::to_string(&vector)?);
    Ok(())
}
