//! The retrieval engine handle.
//!
//! [`RagEngine`] bundles one embedder, one vector store, and the
//! configuration. Construct it once at startup and share it (it is cheap to
//! put behind an `Arc`). Ingestions on one engine run one at a time; queries
//! run concurrently with each other and with ingestion.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{EmbedError, IngestError, QueryError, StoreError};
use crate::ingest::{ingest_document, IngestReport};
use crate::models::SearchResult;
use crate::progress::StatusSender;
use crate::query::{QueryEngine, Synthesis};
use crate::store::{SqliteVectorStore, VectorStore};

pub struct RagEngine {
    config: Config,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    query: QueryEngine,
    status: StatusSender,
    ingest_lock: Mutex<()>,
}

impl RagEngine {
    /// Assemble an engine from parts the host already owns.
    pub fn from_parts(
        config: Config,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        status: StatusSender,
    ) -> Self {
        let query = QueryEngine::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            config.retrieval.clone(),
        );
        Self {
            config,
            embedder,
            store,
            query,
            status,
            ingest_lock: Mutex::new(()),
        }
    }

    /// Use a pool supplied by the host; missing partitions are created.
    pub async fn with_pool(config: Config, pool: SqlitePool, status: StatusSender) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let store = SqliteVectorStore::open(pool).await?;
        Ok(Self::from_parts(config, embedder, Arc::new(store), status))
    }

    /// Open the database named in `config.db.path` and build the embedder.
    pub async fn from_config(config: Config, status: StatusSender) -> Result<Self> {
        let pool = db::connect(&config).await?;
        Self::with_pool(config, pool, status).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Ingest one file. Waits for any ingestion already running on this engine.
    pub async fn load_document(&self, path: &Path) -> Result<IngestReport, IngestError> {
        self.load_document_with_cancel(path, &CancelToken::new()).await
    }

    pub async fn load_document_with_cancel(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<IngestReport, IngestError> {
        let _guard = self.ingest_lock.lock().await;
        ingest_document(
            path,
            Arc::clone(&self.embedder),
            Arc::clone(&self.store),
            &self.config.ingest,
            &self.status,
            cancel,
        )
        .await
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, QueryError> {
        self.query.search(query, limit).await
    }

    pub async fn synthesize(&self, query: &str, limit: usize) -> Result<Synthesis, QueryError> {
        self.query.synthesize(query, limit).await
    }

    /// The `retrieval.store_k` stored records closest to `vector`, without
    /// any query rewriting or reranking.
    pub async fn nearest(&self, vector: &[f32]) -> Result<Vec<SearchResult>, StoreError> {
        self.store.search(vector, self.config.retrieval.store_k).await
    }

    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embedder.embed(text).await
    }

    pub async fn list_loaded_files(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_files().await
    }

    pub async fn remove_file(&self, filename: &str) -> Result<(), StoreError> {
        self.store.remove_by_filename(filename).await
    }
}
