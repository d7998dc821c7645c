//! Types for the orchestrator.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Store or provider error.
    #[error("store error: {0}")]
    Store(#[from] crate::torrent::StoreError),

    /// Downloader backend error.
    #[error("downloader error: {0}")]
    Downloader(#[from] crate::downloader::DownloaderError),

    /// The configured backend is missing its configuration section.
    #[error("backend misconfigured: {0}")]
    BackendMisconfigured(String),

    /// A download record required for processing is missing a field.
    #[error("missing data on download {id}: {what}")]
    MissingData { id: Uuid, what: String },
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorStatus {
    /// Whether the tick driver is running.
    pub running: bool,
    /// Workers currently in the download registry.
    pub active_downloads: usize,
    /// Workers currently in the unpack registry.
    pub active_unpacks: usize,
}

/// Point-in-time view of one torrent's progress, for display.
#[derive(Debug, Clone, Serialize)]
pub struct TorrentProgress {
    pub torrent_id: Uuid,
    pub name: String,
    pub completed: bool,
    /// Completed downloads over total downloads.
    pub downloads_complete: usize,
    pub downloads_total: usize,
    /// doneBytes/totalBytes over all downloads, 0-100.
    pub percent: u32,
}

/// State snapshot pushed to the realtime collaborator after each tick.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorSnapshot {
    pub active_downloads: usize,
    pub active_unpacks: usize,
    pub torrents: Vec<TorrentProgress>,
}

/// Callback receiving the post-tick snapshot.
pub type SnapshotCallback = Arc<dyn Fn(OrchestratorSnapshot) + Send + Sync>;
