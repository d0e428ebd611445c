//! End-to-end: files on disk → mock embedding service → SQLite → queries.

mod common;

use std::path::PathBuf;

use chat_rag::config::{Config, DbConfig, EmbeddingConfig, IngestConfig, RetrievalConfig};
use chat_rag::error::IngestError;
use chat_rag::progress::{status_channel, StatusKind, StatusSender};
use chat_rag::{db, RagEngine};
use common::{MockEmbeddingServer, API_KEY};
use tempfile::TempDir;

const NOTES: &str = "The lighthouse keeper climbed the stairs every evening. \
He lit the lamp and watched the ships pass the rocky point. \
Storms came often in winter. \
The keeper wrote each storm into a leather logbook that sat beside the lamp for years.";

fn test_config(tmp: &TempDir, server: &MockEmbeddingServer) -> Config {
    std::env::set_var("CHAT_RAG_TEST_KEY", API_KEY);
    Config {
        db: DbConfig {
            path: tmp.path().join("data").join("rag.sqlite"),
        },
        embedding: EmbeddingConfig {
            provider: "openai".to_string(),
            url: Some(server.url("/v1/embeddings")),
            model: Some("mock-model".to_string()),
            api_key_env: Some("CHAT_RAG_TEST_KEY".to_string()),
            timeout_secs: 10,
        },
        ingest: IngestConfig {
            word_limit: 15,
            ..IngestConfig::default()
        },
        retrieval: RetrievalConfig::default(),
    }
}

fn write(tmp: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = tmp.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

async fn engine(config: Config, status: StatusSender) -> RagEngine {
    let pool = db::connect(&config).await.unwrap();
    RagEngine::with_pool(config, pool, status).await.unwrap()
}

#[tokio::test]
async fn load_search_remove_roundtrip() {
    let server = MockEmbeddingServer::start().await;
    let tmp = TempDir::new().unwrap();
    let notes = write(&tmp, "notes.txt", NOTES);
    let (status, mut rx) = status_channel(64);
    let engine = engine(test_config(&tmp, &server), status).await;

    let report = engine.load_document(&notes).await.unwrap();
    assert_eq!(report.filename, "notes.txt");
    assert_eq!(report.paragraphs, 2);
    assert_eq!(report.records_written, 2);

    let mut kinds = Vec::new();
    while let Ok(message) = rx.try_recv() {
        kinds.push(StatusKind::classify(&message));
    }
    assert_eq!(kinds.last(), Some(&StatusKind::Finished));
    assert!(kinds.contains(&StatusKind::Loaded));

    assert_eq!(engine.list_loaded_files().await.unwrap(), vec!["notes.txt"]);

    let results = engine.search("lighthouse keeper stairs", 5).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].record.slug, "notes.txt_0_0");
    assert!(results[0].record.raw_text.contains("lighthouse keeper"));
    assert!(results[0].distance <= results[1].distance);

    let synthesis = engine.synthesize("lighthouse keeper", 1).await.unwrap();
    assert_eq!(synthesis.sources.len(), 1);
    assert!(synthesis.context.contains("[source: notes.txt]"));
    assert!(synthesis.answer.starts_with("Found 1 relevant passage:"));

    engine.remove_file("notes.txt").await.unwrap();
    assert!(engine.list_loaded_files().await.unwrap().is_empty());
    assert!(engine.search("lighthouse keeper", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn vectors_survive_reopening_the_database() {
    let server = MockEmbeddingServer::start().await;
    let tmp = TempDir::new().unwrap();
    let notes = write(&tmp, "notes.txt", NOTES);
    let config = test_config(&tmp, &server);

    {
        let first = engine(config.clone(), StatusSender::disconnected()).await;
        first.load_document(&notes).await.unwrap();
    }

    let second = engine(config, StatusSender::disconnected()).await;
    assert_eq!(second.list_loaded_files().await.unwrap(), vec!["notes.txt"]);
    let hits = second.search("logbook storm", 5).await.unwrap();
    assert_eq!(hits[0].record.slug, "notes.txt_0_1");
}

#[tokio::test]
async fn markdown_and_epub_are_searchable() {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let server = MockEmbeddingServer::start().await;
    let tmp = TempDir::new().unwrap();

    let md = write(
        &tmp,
        "guide.md",
        "# Deploy guide\n\nRun the **migration** before the rollout.\n",
    );

    let epub = tmp.path().join("novel.epub");
    {
        let file = std::fs::File::create(&epub).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let opts = SimpleFileOptions::default();
        zip.start_file("mimetype", opts).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        zip.start_file("OEBPS/chapter1.xhtml", opts).unwrap();
        zip.write_all(
            b"<html><body><p>The orchard grew pears and quinces.</p></body></html>",
        )
        .unwrap();
        zip.finish().unwrap();
    }

    let engine = engine(test_config(&tmp, &server), StatusSender::disconnected()).await;
    engine.load_document(&md).await.unwrap();
    engine.load_document(&epub).await.unwrap();

    assert_eq!(
        engine.list_loaded_files().await.unwrap(),
        vec!["guide.md", "novel.epub"]
    );

    let hits = engine.search("orchard pears quinces", 1).await.unwrap();
    assert_eq!(hits[0].record.source_filename, "novel.epub");
    assert!(!hits[0].record.raw_text.contains('<'));

    let hits = engine.search("migration rollout", 1).await.unwrap();
    assert_eq!(hits[0].record.source_filename, "guide.md");
    assert!(!hits[0].record.raw_text.contains("**"));
}

#[tokio::test]
async fn failing_service_reports_failed_status() {
    let server = MockEmbeddingServer::start().await;
    let tmp = TempDir::new().unwrap();
    let notes = write(&tmp, "notes.txt", NOTES);
    let mut config = test_config(&tmp, &server);
    config.embedding.url = Some(server.url("/broken"));

    let (status, mut rx) = status_channel(64);
    let engine = engine(config, status).await;

    let err = engine.load_document(&notes).await.unwrap_err();
    assert!(matches!(err, IngestError::Embed { .. }));

    let mut last = None;
    while let Ok(message) = rx.try_recv() {
        last = Some(message);
    }
    let last = last.unwrap();
    assert_eq!(StatusKind::classify(&last), StatusKind::Failed);
    assert!(engine.list_loaded_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn unsupported_file_is_rejected_before_embedding() {
    let server = MockEmbeddingServer::start().await;
    let tmp = TempDir::new().unwrap();
    let sheet = write(&tmp, "table.xlsx", "not really a spreadsheet");
    let engine = engine(test_config(&tmp, &server), StatusSender::disconnected()).await;

    assert!(matches!(
        engine.load_document(&sheet).await,
        Err(IngestError::Extract(_))
    ));
}
