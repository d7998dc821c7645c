//! Download worker: binds one download record to one backend instance.

use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::config::DownloaderBackend;

use super::types::{CompletionSlot, DownloadProgress, WorkerOutcome};
use super::Downloader;

/// Owns the backend lifecycle for a single download.
///
/// The worker exposes polled state only: the orchestrator checks
/// `finished()` each tick rather than subscribing to completion events.
pub struct DownloadWorker {
    download_id: Uuid,
    downloader: Arc<Downloader>,
    completion: CompletionSlot,
    progress: watch::Receiver<DownloadProgress>,
    remote_id: Arc<RwLock<Option<String>>>,
}

impl DownloadWorker {
    pub fn new(download_id: Uuid, downloader: Arc<Downloader>) -> Self {
        let completion = downloader.completion();
        let progress = downloader.subscribe_progress();
        Self {
            download_id,
            downloader,
            completion,
            progress,
            remote_id: Arc::new(RwLock::new(None)),
        }
    }

    pub fn download_id(&self) -> Uuid {
        self.download_id
    }

    pub fn kind(&self) -> DownloaderBackend {
        self.downloader.kind()
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    /// Drive the backend's start call. An immediate failure is recorded in
    /// the completion slot so the normal reap path picks it up.
    ///
    /// Returns the backend's remote id, if it reported one.
    pub async fn launch(&self) -> Option<String> {
        match self.downloader.start().await {
            Ok(remote_id) => {
                *self.remote_id.write().await = remote_id.clone();
                remote_id
            }
            Err(e) => {
                warn!("Download {} failed to start: {e}", self.download_id);
                self.completion.fail(e.to_string()).await;
                None
            }
        }
    }

    /// Whether the backend reported a terminal outcome.
    pub async fn finished(&self) -> bool {
        self.completion.is_set().await
    }

    pub async fn outcome(&self) -> Option<WorkerOutcome> {
        self.completion.get().await
    }

    pub async fn error(&self) -> Option<String> {
        self.completion
            .get()
            .await
            .and_then(|o| o.error().map(|e| e.to_string()))
    }

    pub async fn remote_id(&self) -> Option<String> {
        self.remote_id.read().await.clone()
    }

    /// Latest transfer counters, display only.
    pub fn progress(&self) -> DownloadProgress {
        *self.progress.borrow()
    }

    /// Cooperative: the worker is still reaped through the normal
    /// finished/error path.
    pub async fn cancel(&self) {
        self.downloader.cancel().await;
    }

    pub async fn pause(&self) {
        self.downloader.pause().await;
    }

    pub async fn resume(&self) {
        self.downloader.resume().await;
    }
}
