//! # chat-rag CLI (`rag`)
//!
//! Command-line front end for the retrieval engine: create the database,
//! load documents, search, and manage what is loaded.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and the vector partitions |
//! | `rag load <path>...` | Extract, embed, and store one or more files |
//! | `rag search "<query>"` | Ranked passages for a query |
//! | `rag files` | List loaded source files |
//! | `rag remove <filename>` | Delete every vector from a source file |
//! | `rag embed "<text>"` | Print the embedding of a text as JSON |
//!
//! Logging is controlled with `RUST_LOG` (default `info`) and goes to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use chat_rag::commands;
use chat_rag::config;
use chat_rag::progress::ProgressMode;

/// Retrieval engine for a chat client: load documents, then search them.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "Document retrieval for chat: load files, embed them, search them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database.
    ///
    /// Creates the SQLite file and one vector table per supported embedding
    /// size. Idempotent.
    Init,

    /// Load documents.
    ///
    /// Supported formats: .txt, .md, .html/.xhtml, .epub, .pdf. Each file is
    /// split into paragraphs, embedded in batches, and stored.
    Load {
        /// Files to load.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Emit progress as JSON lines on stderr.
        #[arg(long)]
        json_progress: bool,

        /// Suppress progress output.
        #[arg(long, conflicts_with = "json_progress")]
        quiet: bool,
    },

    /// Search loaded documents.
    Search {
        /// The query text.
        query: String,

        /// Maximum number of results (default: `retrieval.default_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Print a short digest of the top passages instead of the list.
        #[arg(long)]
        digest: bool,
    },

    /// List loaded source files.
    Files,

    /// Remove every vector loaded from a file.
    Remove {
        /// Filename as shown by `rag files`.
        filename: String,
    },

    /// Embed a text and print the vector.
    Embed { text: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Load {
            paths,
            json_progress,
            quiet,
        } => {
            let mode = if quiet {
                ProgressMode::Off
            } else if json_progress {
                ProgressMode::Json
            } else {
                ProgressMode::default_for_tty()
            };
            commands::run_load(&cfg, &paths, mode).await?;
        }
        Commands::Search {
            query,
            limit,
            digest,
        } => {
            commands::run_search(&cfg, &query, limit, digest).await?;
        }
        Commands::Files => {
            commands::run_files(&cfg).await?;
        }
        Commands::Remove { filename } => {
            commands::run_remove(&cfg, &filename).await?;
        }
        Commands::Embed { text } => {
            commands::run_embed(&cfg, &text).await?;
        }
    }

    Ok(())
}
