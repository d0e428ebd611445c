//! # chat-rag
//!
//! The retrieval engine behind an interactive chat client: load documents,
//! embed them through an external service, store the vectors in SQLite, and
//! answer free-form queries with reranked passages.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────────┐
//! │ Extract  │──▶│  Segment  │──▶│ Embedding │──▶│ Vector store │
//! │ txt/md/… │   │ sentences │   │  workers  │   │ vectors_<d>  │
//! └──────────┘   └───────────┘   └───────────┘   └──────┬───────┘
//!                                                       │
//!                 ┌──────────────────────────────────────┘
//!                 ▼
//!          ┌─────────────┐
//!          │ Query       │  refine → expand → search → rerank
//!          └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init                          # create the vector partitions
//! rag load notes.md book.epub       # ingest files
//! rag search "project architecture" # ranked passages
//! rag search "deploy steps" --digest
//! rag files                         # what is loaded
//! rag remove notes.md
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction per file format |
//! | [`segment`] | Sentence-aware paragraph building |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector`] | Blob encoding and cosine similarity |
//! | [`store`] | Partitioned vector storage |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`query`] | Query refinement, search, and reranking |
//! | [`engine`] | The [`RagEngine`] handle |
//! | [`progress`] | Status channel and CLI reporters |
//! | [`db`] | Database connection |
//! | [`migrate`] | Partition tables |

pub mod cancel;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod query;
pub mod segment;
pub mod store;
pub mod vector;

pub use engine::RagEngine;
