//! In-memory torrent store.
//!
//! Persistent storage is owned by an external collaborator; this in-process
//! implementation backs the daemon and the test suites. Provider-facing calls
//! (unrestrict, select, retry, delete, hooks) are recorded so tests can assert
//! on them, and can be scripted to fail.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{StoreError, TorrentStore};
use super::types::{Download, Torrent};

/// A recorded delete_torrent call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedDeletion {
    pub torrent_id: Uuid,
    pub from_client: bool,
    pub from_provider: bool,
    pub delete_files: bool,
}

#[derive(Debug, Default)]
struct State {
    torrents: HashMap<Uuid, Torrent>,
    downloads: HashMap<Uuid, Download>,
    /// Scripted unrestrict results per download.
    unrestrict_links: HashMap<Uuid, String>,
    unrestrict_failures: HashMap<Uuid, String>,
    /// Links handed to downloads created by create_downloads, in file order.
    created_links: HashMap<Uuid, Vec<String>>,
    retry_failures: HashMap<Uuid, String>,
    hook_failures: HashMap<Uuid, String>,
    deletions: Vec<RecordedDeletion>,
    hooks_run: Vec<Uuid>,
    retries: Vec<(Uuid, u32)>,
    files_selected: Vec<Uuid>,
}

/// In-memory implementation of [`TorrentStore`].
#[derive(Debug, Default)]
pub struct MemoryTorrentStore {
    state: Arc<RwLock<State>>,
}

impl MemoryTorrentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a torrent. Any downloads attached to it are moved into the
    /// download table and re-joined on read.
    pub async fn insert_torrent(&self, mut torrent: Torrent) {
        let downloads = std::mem::take(&mut torrent.downloads);
        let mut state = self.state.write().await;
        for download in downloads {
            state.downloads.insert(download.id, download);
        }
        state.torrents.insert(torrent.id, torrent);
    }

    pub async fn insert_download(&self, download: Download) {
        self.state.write().await.downloads.insert(download.id, download);
    }

    /// Fetch a torrent with its downloads attached, for assertions.
    pub async fn torrent(&self, id: Uuid) -> Option<Torrent> {
        let state = self.state.read().await;
        state.torrents.get(&id).map(|t| {
            let mut torrent = t.clone();
            torrent.downloads = Self::downloads_of(&state, id);
            torrent
        })
    }

    pub async fn download(&self, id: Uuid) -> Option<Download> {
        self.state.read().await.downloads.get(&id).cloned()
    }

    /// Script the unrestrict result for a download.
    pub async fn set_unrestrict_link(&self, download_id: Uuid, link: impl Into<String>) {
        self.state
            .write()
            .await
            .unrestrict_links
            .insert(download_id, link.into());
    }

    /// Make unrestrict fail for a download with the given message.
    pub async fn fail_unrestrict(&self, download_id: Uuid, error: impl Into<String>) {
        self.state
            .write()
            .await
            .unrestrict_failures
            .insert(download_id, error.into());
    }

    /// Links assigned, in order, to downloads created by create_downloads.
    pub async fn set_created_links(&self, torrent_id: Uuid, links: Vec<String>) {
        self.state.write().await.created_links.insert(torrent_id, links);
    }

    /// Make retry_torrent fail for a torrent with the given message.
    pub async fn fail_retry(&self, torrent_id: Uuid, error: impl Into<String>) {
        self.state
            .write()
            .await
            .retry_failures
            .insert(torrent_id, error.into());
    }

    /// Make the post-complete hook fail for a torrent.
    pub async fn fail_post_complete_hook(&self, torrent_id: Uuid, error: impl Into<String>) {
        self.state
            .write()
            .await
            .hook_failures
            .insert(torrent_id, error.into());
    }

    pub async fn deletions(&self) -> Vec<RecordedDeletion> {
        self.state.read().await.deletions.clone()
    }

    pub async fn hooks_run(&self) -> Vec<Uuid> {
        self.state.read().await.hooks_run.clone()
    }

    pub async fn retries(&self) -> Vec<(Uuid, u32)> {
        self.state.read().await.retries.clone()
    }

    pub async fn files_selected_calls(&self) -> Vec<Uuid> {
        self.state.read().await.files_selected.clone()
    }

    fn downloads_of(state: &State, torrent_id: Uuid) -> Vec<Download> {
        let mut downloads: Vec<Download> = state
            .downloads
            .values()
            .filter(|d| d.torrent_id == torrent_id)
            .cloned()
            .collect();
        downloads.sort_by(|a, b| {
            a.download_queued
                .cmp(&b.download_queued)
                .then_with(|| a.id.cmp(&b.id))
        });
        downloads
    }

    async fn with_download<F>(&self, id: Uuid, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Download),
    {
        let mut state = self.state.write().await;
        let download = state
            .downloads
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("download {id}")))?;
        f(download);
        Ok(())
    }

    async fn with_torrent<F>(&self, id: Uuid, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Torrent),
    {
        let mut state = self.state.write().await;
        let torrent = state
            .torrents
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("torrent {id}")))?;
        f(torrent);
        Ok(())
    }
}

#[async_trait]
impl TorrentStore for MemoryTorrentStore {
    async fn get_torrents(&self) -> Result<Vec<Torrent>, StoreError> {
        let state = self.state.read().await;
        let mut torrents: Vec<Torrent> = state
            .torrents
            .values()
            .map(|t| {
                let mut torrent = t.clone();
                torrent.downloads = Self::downloads_of(&state, t.id);
                torrent
            })
            .collect();
        torrents.sort_by(|a, b| a.added.cmp(&b.added).then_with(|| a.id.cmp(&b.id)));
        Ok(torrents)
    }

    async fn get_torrent(&self, id: Uuid) -> Result<Option<Torrent>, StoreError> {
        Ok(self.torrent(id).await)
    }

    async fn get_download(&self, id: Uuid) -> Result<Option<Download>, StoreError> {
        Ok(self.state.read().await.downloads.get(&id).cloned())
    }

    async fn update_download_started(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.with_download(id, |d| d.download_started = at).await
    }

    async fn update_download_finished(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.with_download(id, |d| d.download_finished = at).await
    }

    async fn update_unpacking_queued(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.with_download(id, |d| d.unpacking_queued = at).await
    }

    async fn update_unpacking_started(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.with_download(id, |d| d.unpacking_started = at).await
    }

    async fn update_unpacking_finished(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.with_download(id, |d| d.unpacking_finished = at).await
    }

    async fn update_download_completed(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.with_download(id, |d| {
            // Terminal timestamps only move forward.
            if d.completed.is_none() {
                d.completed = at;
            }
        })
        .await
    }

    async fn update_download_error(&self, id: Uuid, error: String) -> Result<(), StoreError> {
        self.with_download(id, |d| d.error = Some(error)).await
    }

    async fn update_download_retry_count(&self, id: Uuid, count: u32) -> Result<(), StoreError> {
        self.with_download(id, |d| d.retry_count = count).await
    }

    async fn update_download_progress(
        &self,
        id: Uuid,
        bytes_done: u64,
        bytes_total: u64,
        speed: u64,
    ) -> Result<(), StoreError> {
        self.with_download(id, |d| {
            d.bytes_done = bytes_done;
            if bytes_total > 0 {
                d.bytes_total = bytes_total;
            }
            d.speed = speed;
        })
        .await
    }

    async fn reset_download(&self, id: Uuid) -> Result<(), StoreError> {
        self.with_download(id, |d| {
            d.download_started = None;
            d.download_finished = None;
            d.unpacking_queued = None;
            d.unpacking_started = None;
            d.unpacking_finished = None;
            d.completed = None;
            d.error = None;
            d.remote_id = None;
            d.bytes_done = 0;
            d.speed = 0;
        })
        .await
    }

    async fn update_remote_ids(&self, ids: &HashMap<Uuid, String>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for (id, remote_id) in ids {
            if let Some(download) = state.downloads.get_mut(id) {
                download.remote_id = Some(remote_id.clone());
            }
        }
        Ok(())
    }

    async fn update_download_errors(
        &self,
        errors: &HashMap<Uuid, String>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for (id, error) in errors {
            if let Some(download) = state.downloads.get_mut(id) {
                download.error = Some(error.clone());
            }
        }
        Ok(())
    }

    async fn update_files_selected(
        &self,
        torrent_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_torrent(torrent_id, |t| t.files_selected = Some(at))
            .await
    }

    async fn update_torrent_retry(
        &self,
        torrent_id: Uuid,
        retry: Option<DateTime<Utc>>,
        retry_count: u32,
    ) -> Result<(), StoreError> {
        self.with_torrent(torrent_id, |t| {
            t.retry = retry;
            t.retry_count = retry_count;
        })
        .await
    }

    async fn update_torrent_complete(
        &self,
        torrent_id: Uuid,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_torrent(torrent_id, |t| {
            if t.completed.is_none() {
                t.completed = Some(at);
            }
            if error.is_some() {
                t.error = error;
            }
        })
        .await
    }

    async fn update_torrent_error(
        &self,
        torrent_id: Uuid,
        error: String,
    ) -> Result<(), StoreError> {
        self.with_torrent(torrent_id, |t| t.error = Some(error)).await
    }

    async fn unrestrict_link(&self, download_id: Uuid) -> Result<String, StoreError> {
        let state = self.state.read().await;
        if let Some(error) = state.unrestrict_failures.get(&download_id) {
            return Err(StoreError::Provider(error.clone()));
        }
        state
            .unrestrict_links
            .get(&download_id)
            .cloned()
            .ok_or_else(|| StoreError::Provider("no unrestricted link available".to_string()))
    }

    async fn select_files(&self, torrent_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.torrents.contains_key(&torrent_id) {
            return Err(StoreError::NotFound(format!("torrent {torrent_id}")));
        }
        state.files_selected.push(torrent_id);
        Ok(())
    }

    async fn create_downloads(&self, torrent_id: Uuid) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let torrent = state
            .torrents
            .get(&torrent_id)
            .ok_or_else(|| StoreError::NotFound(format!("torrent {torrent_id}")))?;
        let files = torrent.files.clone();
        let links = state.created_links.get(&torrent_id).cloned().unwrap_or_default();

        for (idx, file) in files.iter().enumerate() {
            let download = Download {
                id: Uuid::new_v4(),
                torrent_id,
                remote_id: None,
                link: links.get(idx).cloned(),
                download_queued: Some(now),
                download_started: None,
                download_finished: None,
                unpacking_queued: None,
                unpacking_started: None,
                unpacking_finished: None,
                completed: None,
                error: None,
                retry_count: 0,
                bytes_total: file.bytes,
                bytes_done: 0,
                speed: 0,
            };
            state.downloads.insert(download.id, download);
        }
        Ok(())
    }

    async fn retry_torrent(&self, torrent_id: Uuid, retry_count: u32) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.retry_failures.get(&torrent_id) {
            return Err(StoreError::Provider(error.clone()));
        }
        let torrent = state
            .torrents
            .get_mut(&torrent_id)
            .ok_or_else(|| StoreError::NotFound(format!("torrent {torrent_id}")))?;
        // Re-submission: the torrent goes back to a clean slate and its
        // downloads are recreated once the provider finishes again.
        torrent.retry = None;
        torrent.retry_count = retry_count + 1;
        torrent.error = None;
        torrent.completed = None;
        torrent.files_selected = None;
        state.downloads.retain(|_, d| d.torrent_id != torrent_id);
        state.retries.push((torrent_id, retry_count));
        Ok(())
    }

    async fn delete_torrent(
        &self,
        torrent_id: Uuid,
        from_client: bool,
        from_provider: bool,
        delete_files: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.deletions.push(RecordedDeletion {
            torrent_id,
            from_client,
            from_provider,
            delete_files,
        });
        if from_client {
            state.torrents.remove(&torrent_id);
            state.downloads.retain(|_, d| d.torrent_id != torrent_id);
        }
        Ok(())
    }

    async fn run_post_complete_hook(&self, torrent_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.hook_failures.get(&torrent_id) {
            return Err(StoreError::Internal(error.clone()));
        }
        state.hooks_run.push(torrent_id);
        Ok(())
    }
}
