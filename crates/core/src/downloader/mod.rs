//! Downloader backends.
//!
//! A [`Downloader`] moves one provider file onto the host. Two backends
//! exist: delegation to an external aria2 agent, and symlink resolution
//! against a mounted remote filesystem.

mod aria2;
mod symlink;
mod types;
mod worker;

pub use aria2::{AgentJob, Aria2Client, Aria2Downloader};
pub use symlink::SymlinkDownloader;
pub use types::{CompletionSlot, DownloadProgress, DownloaderError, WorkerOutcome};
pub use worker::DownloadWorker;

use tokio::sync::watch;

use crate::config::DownloaderBackend;

/// A concrete downloader instance, tagged by backend.
///
/// Dispatch is by capability: `start`, `cancel`, `pause`, `resume`. No-op
/// implementations of the latter three are valid. Completion is reported
/// through the backend's [`CompletionSlot`], progress through a watch
/// channel; neither is delivered as a push event.
pub enum Downloader {
    Aria2(Aria2Downloader),
    Symlink(SymlinkDownloader),
}

impl Downloader {
    pub fn kind(&self) -> DownloaderBackend {
        match self {
            Downloader::Aria2(_) => DownloaderBackend::Aria2,
            Downloader::Symlink(_) => DownloaderBackend::Symlink,
        }
    }

    /// Begin the transfer. Agent backends submit the job and return its
    /// remote id, completing later through the slot; the symlink backend
    /// drives discovery to completion before returning.
    pub async fn start(&self) -> Result<Option<String>, DownloaderError> {
        match self {
            Downloader::Aria2(d) => d.start().await,
            Downloader::Symlink(d) => d.start().await,
        }
    }

    pub async fn cancel(&self) {
        match self {
            Downloader::Aria2(d) => d.cancel().await,
            Downloader::Symlink(d) => d.cancel().await,
        }
    }

    pub async fn pause(&self) {
        match self {
            Downloader::Aria2(d) => d.pause().await,
            Downloader::Symlink(d) => d.pause().await,
        }
    }

    pub async fn resume(&self) {
        match self {
            Downloader::Aria2(d) => d.resume().await,
            Downloader::Symlink(d) => d.resume().await,
        }
    }

    pub fn completion(&self) -> CompletionSlot {
        match self {
            Downloader::Aria2(d) => d.completion(),
            Downloader::Symlink(d) => d.completion(),
        }
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<DownloadProgress> {
        match self {
            Downloader::Aria2(d) => d.subscribe_progress(),
            Downloader::Symlink(d) => d.subscribe_progress(),
        }
    }
}
