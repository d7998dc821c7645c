//! Repository seam for torrent and download records.
//!
//! The orchestrator never owns storage; every record mutation and every
//! provider-facing call goes through this trait. Updates are targeted and
//! idempotent so a repeated tick cannot corrupt state.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::types::{Download, Torrent};

/// Error type for store and provider operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The debrid provider rejected or failed a call.
    #[error("provider error: {0}")]
    Provider(String),

    /// Anything else.
    #[error("store error: {0}")]
    Internal(String),
}

/// Trait for the torrent/download repository and its provider-facing calls.
#[async_trait]
pub trait TorrentStore: Send + Sync {
    /// All known torrents, downloads attached in queue order.
    async fn get_torrents(&self) -> Result<Vec<Torrent>, StoreError>;

    /// A single torrent with downloads attached, or None if deleted.
    async fn get_torrent(&self, id: Uuid) -> Result<Option<Torrent>, StoreError>;

    /// A single download, or None when it was deleted externally.
    async fn get_download(&self, id: Uuid) -> Result<Option<Download>, StoreError>;

    async fn update_download_started(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn update_download_finished(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn update_unpacking_queued(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn update_unpacking_started(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn update_unpacking_finished(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn update_download_completed(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn update_download_error(&self, id: Uuid, error: String) -> Result<(), StoreError>;

    async fn update_download_retry_count(&self, id: Uuid, count: u32) -> Result<(), StoreError>;

    /// Display-only transfer counters.
    async fn update_download_progress(
        &self,
        id: Uuid,
        bytes_done: u64,
        bytes_total: u64,
        speed: u64,
    ) -> Result<(), StoreError>;

    /// Clear progress stamps and error so the download is re-admitted on the
    /// next tick. The queue timestamp is preserved.
    async fn reset_download(&self, id: Uuid) -> Result<(), StoreError>;

    /// Bulk write of backend remote ids gathered during a launch batch.
    async fn update_remote_ids(&self, ids: &HashMap<Uuid, String>) -> Result<(), StoreError>;

    /// Bulk write of launch errors gathered during a launch batch.
    async fn update_download_errors(
        &self,
        errors: &HashMap<Uuid, String>,
    ) -> Result<(), StoreError>;

    async fn update_files_selected(
        &self,
        torrent_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Set or clear the whole-torrent retry flag and store the retry counter.
    async fn update_torrent_retry(
        &self,
        torrent_id: Uuid,
        retry: Option<DateTime<Utc>>,
        retry_count: u32,
    ) -> Result<(), StoreError>;

    /// Mark a torrent terminal. A completed timestamp that is already set is
    /// never cleared or moved.
    async fn update_torrent_complete(
        &self,
        torrent_id: Uuid,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn update_torrent_error(&self, torrent_id: Uuid, error: String)
        -> Result<(), StoreError>;

    /// Convert a restricted provider file reference into a fetchable URL.
    async fn unrestrict_link(&self, download_id: Uuid) -> Result<String, StoreError>;

    /// Ask the provider to select which files of the torrent to fetch.
    async fn select_files(&self, torrent_id: Uuid) -> Result<(), StoreError>;

    /// Create one download row per selected file with provider links attached.
    async fn create_downloads(&self, torrent_id: Uuid) -> Result<(), StoreError>;

    /// Re-submit the whole torrent to the provider.
    async fn retry_torrent(&self, torrent_id: Uuid, retry_count: u32) -> Result<(), StoreError>;

    /// Delete the torrent from the local client and/or the provider.
    async fn delete_torrent(
        &self,
        torrent_id: Uuid,
        from_client: bool,
        from_provider: bool,
        delete_files: bool,
    ) -> Result<(), StoreError>;

    /// Run the configured post-completion hook for a torrent.
    async fn run_post_complete_hook(&self, torrent_id: Uuid) -> Result<(), StoreError>;
}
