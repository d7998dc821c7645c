//! Shared types for downloader backends and workers.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur while transferring a file to the host.
#[derive(Debug, Error)]
pub enum DownloaderError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Error text reported by the download agent, surfaced verbatim.
    #[error("agent error: {0}")]
    Agent(String),

    #[error("request timeout")]
    Timeout,

    /// Symlinking a compressed container is never useful.
    #[error("cannot handle archive file with the symlink backend: {0}")]
    UnsupportedArchive(String),

    #[error("source file not found in mount: {0}")]
    SourceNotFound(String),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

/// Transfer counters for display. Never drives orchestration decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    pub bytes_done: u64,
    pub bytes_total: u64,
    /// Bytes per second.
    pub speed: u64,
}

/// Terminal result of a worker.
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    /// Finished; path points at the materialized file or extraction target.
    Success { path: PathBuf },
    /// Failed; message is surfaced verbatim to operators.
    Failed { error: String },
}

impl WorkerOutcome {
    pub fn error(&self) -> Option<&str> {
        match self {
            WorkerOutcome::Success { .. } => None,
            WorkerOutcome::Failed { error } => Some(error),
        }
    }
}

/// Shared slot a backend writes its terminal outcome into.
///
/// The owning worker polls it each tick instead of subscribing to push
/// events. The first write wins; later writes are ignored.
#[derive(Debug, Clone, Default)]
pub struct CompletionSlot {
    inner: Arc<RwLock<Option<WorkerOutcome>>>,
}

impl CompletionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record success. No-op if an outcome is already set.
    pub async fn succeed(&self, path: PathBuf) {
        let mut slot = self.inner.write().await;
        if slot.is_none() {
            *slot = Some(WorkerOutcome::Success { path });
        }
    }

    /// Record failure. No-op if an outcome is already set.
    pub async fn fail(&self, error: impl Into<String>) {
        let mut slot = self.inner.write().await;
        if slot.is_none() {
            *slot = Some(WorkerOutcome::Failed {
                error: error.into(),
            });
        }
    }

    pub async fn get(&self) -> Option<WorkerOutcome> {
        self.inner.read().await.clone()
    }

    pub async fn is_set(&self) -> bool {
        self.inner.read().await.is_some()
    }
}
