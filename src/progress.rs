//! Ingestion status reporting.
//!
//! The pipeline publishes short human-readable status strings on a bounded
//! channel. Publishing never blocks: when the consumer is not keeping up the
//! update is dropped. The consumer (a UI, or the `rag` CLI) drains the
//! receiver and renders the messages however it likes.
//!
//! Status contract with consumers:
//!
//! | Message | Meaning |
//! |---------|---------|
//! | `loading <file>` | ingestion started |
//! | anything else | intermediate progress |
//! | `loaded file <name>` | every batch of `<name>` is stored |
//! | `finished` | terminal, success |
//! | `failed: <reason>` | terminal, error |
//!
//! The CLI reporters at the bottom print these on **stderr** so stdout
//! stays parseable for scripts.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

pub const STATUS_FINISHED: &str = "finished";
pub const STATUS_LOADED_PREFIX: &str = "loaded file";
pub const STATUS_FAILED_PREFIX: &str = "failed:";

/// Non-blocking producer half of the status channel.
///
/// Cloning shares the underlying channel and the dropped-update counter.
#[derive(Clone, Debug, Default)]
pub struct StatusSender {
    tx: Option<mpsc::Sender<String>>,
    dropped: Arc<AtomicU64>,
}

/// Bounded status channel. `capacity` is clamped to at least 1.
pub fn status_channel(capacity: usize) -> (StatusSender, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        StatusSender {
            tx: Some(tx),
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

impl StatusSender {
    /// A sender with no consumer. Every update is discarded.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Publish `message` if there is room; otherwise drop it.
    pub fn send(&self, message: impl Into<String>) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(message.into()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(msg)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(dropped = n, status = %msg, "status channel full; update dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Updates dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn loading(&self, filename: &str) {
        self.send(format!("loading {}", filename));
    }

    pub(crate) fn loaded(&self, filename: &str) {
        self.send(format!("{} {}", STATUS_LOADED_PREFIX, filename));
    }

    pub(crate) fn finished(&self) {
        self.send(STATUS_FINISHED);
    }

    pub(crate) fn failed(&self, reason: &dyn std::fmt::Display) {
        self.send(format!("{} {}", STATUS_FAILED_PREFIX, reason));
    }
}

/// How a status message should be rendered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusKind {
    Progress,
    Loaded,
    Finished,
    Failed,
}

impl StatusKind {
    pub fn classify(message: &str) -> Self {
        if message == STATUS_FINISHED {
            StatusKind::Finished
        } else if message.starts_with(STATUS_LOADED_PREFIX) {
            StatusKind::Loaded
        } else if message.starts_with(STATUS_FAILED_PREFIX) {
            StatusKind::Failed
        } else {
            StatusKind::Progress
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StatusKind::Finished | StatusKind::Failed)
    }

    fn as_str(self) -> &'static str {
        match self {
            StatusKind::Progress => "progress",
            StatusKind::Loaded => "loaded",
            StatusKind::Finished => "finished",
            StatusKind::Failed => "failed",
        }
    }
}

// ============ CLI reporters ============

/// Renders drained status messages.
pub trait StatusReporter: Send + Sync {
    fn report(&self, message: &str);
}

/// Human-friendly progress on stderr: `load  stored batch 3/12`.
pub struct StderrProgress;

impl StatusReporter for StderrProgress {
    fn report(&self, message: &str) {
        let line = format!("load  {}\n", message);
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl StatusReporter for JsonProgress {
    fn report(&self, message: &str) {
        let obj = serde_json::json!({
            "event": "status",
            "kind": StatusKind::classify(message).as_str(),
            "message": message,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl StatusReporter for NoProgress {
    fn report(&self, _message: &str) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn StatusReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
