//! Orchestrator implementation.
//!
//! One tick reconciles the whole world: reaps finished workers, applies
//! retry and expiry policy, admits new work up to the registry ceilings and
//! drives the torrent- and download-level state machines. Ticks run
//! serially; per-torrent bodies run sequentially within a tick, while
//! download launches within a torrent run concurrently once admitted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, DownloaderBackend};
use crate::downloader::{
    Aria2Client, Aria2Downloader, DownloadWorker, Downloader, SymlinkDownloader, WorkerOutcome,
};
use crate::metrics;
use crate::torrent::{
    Download, FinishedAction, HostDownloadAction, Torrent, TorrentStatus, TorrentStore,
};
use crate::unpack::{is_archive_file, UnpackWorker};

use super::registry::WorkerRegistry;
use super::types::{
    OrchestratorError, OrchestratorSnapshot, OrchestratorStatus, SnapshotCallback, TorrentProgress,
};

/// The reconciliation engine.
pub struct Orchestrator {
    config: Config,
    store: Arc<dyn TorrentStore>,
    aria2: Option<Arc<Aria2Client>>,
    downloads: WorkerRegistry<DownloadWorker>,
    unpacks: WorkerRegistry<UnpackWorker>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    snapshot_callback: Option<SnapshotCallback>,
}

impl Orchestrator {
    /// Create a new orchestrator. Registries are owned by the instance, so
    /// independent orchestrators never share worker state.
    pub fn new(config: Config, store: Arc<dyn TorrentStore>) -> Self {
        let aria2 = match config.downloader.backend {
            DownloaderBackend::Aria2 => config
                .downloader
                .aria2
                .clone()
                .map(|c| Arc::new(Aria2Client::new(c))),
            DownloaderBackend::Symlink => None,
        };
        let downloads = WorkerRegistry::new(config.general.download_limit);
        let unpacks = WorkerRegistry::new(config.general.unpack_limit);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            aria2,
            downloads,
            unpacks,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            snapshot_callback: None,
        }
    }

    /// Attach the callback receiving a state snapshot after each tick.
    pub fn with_snapshot_callback(mut self, callback: SnapshotCallback) -> Self {
        self.snapshot_callback = Some(callback);
        self
    }

    pub fn active_downloads(&self) -> &WorkerRegistry<DownloadWorker> {
        &self.downloads
    }

    pub fn active_unpacks(&self) -> &WorkerRegistry<UnpackWorker> {
        &self.unpacks
    }

    /// Startup recovery: downloads caught mid-transfer or mid-unpack by a
    /// shutdown lose their started stamp so the next tick restarts them.
    pub async fn initialize(&self) -> Result<(), OrchestratorError> {
        info!("Initializing orchestrator");

        let torrents = self.store.get_torrents().await?;
        let pending: Vec<&Torrent> = torrents.iter().filter(|t| t.completed.is_none()).collect();
        info!("Found {} not completed torrents", pending.len());

        for torrent in pending {
            for download in &torrent.downloads {
                if download.download_queued.is_some()
                    && download.download_started.is_some()
                    && download.download_finished.is_none()
                    && download.error.is_none()
                {
                    debug!(
                        "Resetting download status {} {}",
                        download.to_log(),
                        torrent.to_log()
                    );
                    self.store.update_download_started(download.id, None).await?;
                }

                if download.unpacking_queued.is_some()
                    && download.unpacking_started.is_some()
                    && download.unpacking_finished.is_none()
                    && download.error.is_none()
                {
                    debug!(
                        "Resetting unpack status {} {}",
                        download.to_log(),
                        torrent.to_log()
                    );
                    self.store
                        .update_unpacking_started(download.id, None)
                        .await?;
                }
            }
        }

        info!("Orchestrator initialized");
        Ok(())
    }

    /// Start the tick driver. Ticks are awaited before the next interval
    /// sleep begins, so no two ticks ever overlap.
    pub fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!("Starting orchestrator");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let orchestrator = self;

        tokio::spawn(async move {
            info!("Tick loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Tick loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(orchestrator.config.orchestrator.tick_interval_ms)) => {
                        if !orchestrator.running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = orchestrator.tick().await {
                            warn!("Tick failed: {e}");
                        }
                    }
                }
            }
            info!("Tick loop stopped");
        });
    }

    /// Stop the tick driver gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping orchestrator");
        let _ = self.shutdown_tx.send(());
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.running.load(Ordering::Relaxed),
            active_downloads: self.downloads.len().await,
            active_unpacks: self.unpacks.len().await,
        }
    }

    /// One execution of the reconciliation loop.
    pub async fn tick(&self) -> Result<(), OrchestratorError> {
        // Fail-soft preconditions: a missing key or mount skips the whole
        // tick and is retried on the next one.
        if self.config.provider.api_key.trim().is_empty() {
            debug!("No provider API key set, skipping tick");
            return Ok(());
        }

        if self.config.downloader.backend == DownloaderBackend::Symlink {
            let mount = self
                .config
                .downloader
                .symlink
                .as_ref()
                .map(|s| s.mount_path.clone())
                .unwrap_or_default();
            if tokio::fs::metadata(&mount).await.is_err() {
                warn!("Mount path {} was not found, skipping tick", mount.display());
                return Ok(());
            }
        }

        let started = Instant::now();
        metrics::TICKS_TOTAL.inc();

        if !self.downloads.is_empty().await || !self.unpacks.is_empty().await {
            debug!(
                "Tick start, {} active downloads, {} active unpacks",
                self.downloads.len().await,
                self.unpacks.len().await
            );
        }

        self.poll_agent().await;
        self.reap_downloads().await?;
        self.reap_unpacks().await?;

        let torrents = self.store.get_torrents().await?;
        self.process_retries(&torrents).await?;
        self.process_error_expiry(&torrents).await?;
        self.process_lifetime_expiry(&torrents).await?;

        // Expiry and retries mutate records; process from a fresh read.
        let torrents = self.store.get_torrents().await?;
        let active: Vec<&Torrent> = torrents.iter().filter(|t| t.completed.is_none()).collect();
        if !active.is_empty() {
            debug!("Processing {} torrents", active.len());
        }

        for torrent in active {
            if let Err(e) = self.process_torrent(torrent).await {
                // One torrent failing never aborts the tick for the others.
                error!(
                    "Torrent processing resulted in an unexpected error: {e} {}",
                    torrent.to_log()
                );
                self.store
                    .update_torrent_complete(torrent.id, Some(e.to_string()), Utc::now())
                    .await?;
            }
        }

        self.push_snapshot().await?;

        let elapsed = started.elapsed();
        metrics::TICK_DURATION.observe(elapsed.as_secs_f64());
        if elapsed > Duration::from_secs(1) {
            info!("Tick end (took {}ms)", elapsed.as_millis());
        }

        Ok(())
    }

    /// One batched agent status call per tick, fanned out to every active
    /// agent worker. Keeps the call volume flat under high concurrency.
    async fn poll_agent(&self) {
        let Some(client) = &self.aria2 else {
            return;
        };

        let workers = self.downloads.snapshot().await;
        let agent_workers: Vec<_> = workers
            .iter()
            .filter(|(_, w)| w.kind() == DownloaderBackend::Aria2)
            .collect();
        if agent_workers.is_empty() {
            return;
        }

        debug!("Updating agent status for {} workers", agent_workers.len());
        let jobs = match client.tell_all().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Agent status poll failed: {e}");
                return;
            }
        };
        debug!("Agent reported {} jobs", jobs.len());

        for (id, worker) in agent_workers {
            if let Downloader::Aria2(downloader) = worker.downloader() {
                downloader.apply_status(&jobs).await;
            }
            let progress = worker.progress();
            if progress.bytes_total > 0 {
                let _ = self
                    .store
                    .update_download_progress(
                        *id,
                        progress.bytes_done,
                        progress.bytes_total,
                        progress.speed,
                    )
                    .await;
            }
        }
    }

    /// Reap finished download workers: apply retry policy on error, queue
    /// unpack evaluation on success, drop orphans.
    async fn reap_downloads(&self) -> Result<(), OrchestratorError> {
        let mut finished = Vec::new();
        for (id, worker) in self.downloads.snapshot().await {
            if worker.finished().await {
                finished.push((id, worker));
            }
        }
        if finished.is_empty() {
            return Ok(());
        }

        debug!("Processing {} completed downloads", finished.len());

        for (download_id, worker) in finished {
            let Some(download) = self.store.get_download(download_id).await? else {
                // The record was deleted externally; the worker is an orphan.
                self.downloads.remove(download_id).await;
                debug!("Download {download_id} not found, removed from download registry");
                continue;
            };

            match worker.outcome().await {
                Some(WorkerOutcome::Failed { error }) => {
                    let attempts = self
                        .store
                        .get_torrent(download.torrent_id)
                        .await?
                        .map(|t| t.download_retry_attempts)
                        .unwrap_or(0);

                    warn!("Download reported an error: {error} {}", download.to_log());
                    debug!(
                        "Download retry count {}/{attempts} {}",
                        download.retry_count,
                        download.to_log()
                    );

                    if download.retry_count < attempts {
                        debug!("Retrying download {}", download.to_log());
                        metrics::DOWNLOAD_RETRIES.inc();
                        self.store.reset_download(download_id).await?;
                        self.store
                            .update_download_retry_count(download_id, download.retry_count + 1)
                            .await?;
                    } else {
                        debug!("Not retrying download {}", download.to_log());
                        metrics::DOWNLOADS_FAILED.inc();
                        self.store.update_download_error(download_id, error).await?;
                        self.store
                            .update_download_completed(download_id, Some(Utc::now()))
                            .await?;
                    }
                }
                Some(WorkerOutcome::Success { .. }) => {
                    debug!("Download finished successfully {}", download.to_log());
                    metrics::DOWNLOADS_COMPLETED.inc();

                    let progress = worker.progress();
                    if progress.bytes_total > 0 {
                        let _ = self
                            .store
                            .update_download_progress(
                                download_id,
                                progress.bytes_total,
                                progress.bytes_total,
                                0,
                            )
                            .await;
                    }

                    let now = Utc::now();
                    self.store
                        .update_download_finished(download_id, Some(now))
                        .await?;
                    // Always queued for unpack evaluation; whether extraction
                    // is actually needed is decided at unpack admission.
                    self.store
                        .update_unpacking_queued(download_id, Some(now))
                        .await?;
                }
                None => continue,
            }

            self.downloads.remove(download_id).await;
            debug!("Removed from download registry {}", download.to_log());
        }

        Ok(())
    }

    /// Reap finished unpack workers.
    async fn reap_unpacks(&self) -> Result<(), OrchestratorError> {
        let mut finished = Vec::new();
        for (id, worker) in self.unpacks.snapshot().await {
            if worker.finished().await {
                finished.push((id, worker));
            }
        }
        if finished.is_empty() {
            return Ok(());
        }

        debug!("Processing {} completed unpacks", finished.len());

        for (download_id, worker) in finished {
            let Some(download) = self.store.get_download(download_id).await? else {
                self.unpacks.remove(download_id).await;
                debug!("Download {download_id} not found, removed from unpack registry");
                continue;
            };

            match worker.outcome().await {
                Some(WorkerOutcome::Failed { error }) => {
                    warn!("Unpack reported an error: {error} {}", download.to_log());
                    metrics::UNPACKS_FAILED.inc();
                    self.store.update_download_error(download_id, error).await?;
                    self.store
                        .update_download_completed(download_id, Some(Utc::now()))
                        .await?;
                }
                Some(WorkerOutcome::Success { .. }) => {
                    debug!("Unpack finished successfully {}", download.to_log());
                    metrics::UNPACKS_COMPLETED.inc();
                    let now = Utc::now();
                    self.store
                        .update_unpacking_finished(download_id, Some(now))
                        .await?;
                    self.store
                        .update_download_completed(download_id, Some(now))
                        .await?;
                }
                None => continue,
            }

            self.unpacks.remove(download_id).await;
            debug!("Removed from unpack registry {}", download.to_log());
        }

        Ok(())
    }

    /// Drive the whole-torrent retry queue.
    async fn process_retries(&self, torrents: &[Torrent]) -> Result<(), OrchestratorError> {
        for torrent in torrents.iter().filter(|t| t.retry.is_some()) {
            debug!(
                "Retrying torrent {}/{} {}",
                torrent.retry_count,
                torrent.torrent_retry_attempts,
                torrent.to_log()
            );

            if torrent.retry_count > torrent.torrent_retry_attempts {
                self.store
                    .update_torrent_retry(torrent.id, None, torrent.retry_count)
                    .await?;
                debug!("Torrent reached max retry count {}", torrent.to_log());
                continue;
            }

            metrics::TORRENT_RETRIES.inc();
            if let Err(e) = self.store.retry_torrent(torrent.id, torrent.retry_count).await {
                self.store
                    .update_torrent_retry(torrent.id, None, torrent.retry_count)
                    .await?;
                self.store
                    .update_torrent_error(torrent.id, e.to_string())
                    .await?;
            }
        }
        Ok(())
    }

    /// Delete errored torrents whose delete-on-error window has elapsed.
    async fn process_error_expiry(&self, torrents: &[Torrent]) -> Result<(), OrchestratorError> {
        for torrent in torrents
            .iter()
            .filter(|t| t.error.is_some() && t.delete_on_error > 0)
        {
            let Some(completed) = torrent.completed else {
                continue;
            };
            if completed + chrono::Duration::minutes(torrent.delete_on_error) > Utc::now() {
                continue;
            }

            info!(
                "Removing torrent after {} minutes in the error state {}",
                torrent.delete_on_error,
                torrent.to_log()
            );
            self.store.delete_torrent(torrent.id, true, true, true).await?;
        }
        Ok(())
    }

    /// Error out torrents that produced no downloads within their lifetime.
    async fn process_lifetime_expiry(&self, torrents: &[Torrent]) -> Result<(), OrchestratorError> {
        for torrent in torrents
            .iter()
            .filter(|t| t.downloads.is_empty() && t.completed.is_none() && t.lifetime > 0)
        {
            if torrent.added + chrono::Duration::minutes(torrent.lifetime) > Utc::now() {
                continue;
            }

            info!(
                "Torrent reached its {} minute lifetime, marking as error {}",
                torrent.lifetime,
                torrent.to_log()
            );
            // Max out the retry counter so the error is not auto-retried.
            self.store
                .update_torrent_retry(torrent.id, None, torrent.torrent_retry_attempts)
                .await?;
            self.store
                .update_torrent_complete(
                    torrent.id,
                    Some(format!(
                        "Torrent lifetime of {} minutes reached",
                        torrent.lifetime
                    )),
                    Utc::now(),
                )
                .await?;
        }
        Ok(())
    }

    /// Per-torrent state machine body. Errors are caught by the caller and
    /// recorded as a torrent-level error.
    async fn process_torrent(&self, torrent: &Torrent) -> Result<(), OrchestratorError> {
        self.start_queued_downloads(torrent).await?;
        self.start_queued_unpacks(torrent).await?;

        debug!("Processing {}", torrent.to_log());

        // A provider-side error is terminal for the torrent.
        if torrent.status == TorrentStatus::Error {
            warn!(
                "Torrent reported a provider error: {} {}",
                torrent.status_raw,
                torrent.to_log()
            );
            self.store
                .update_torrent_complete(
                    torrent.id,
                    Some(format!("Received provider error: {}", torrent.status_raw)),
                    Utc::now(),
                )
                .await?;
            return Ok(());
        }

        // The provider waits for a file selection before it starts.
        if (torrent.status == TorrentStatus::WaitingForFileSelection
            || torrent.status == TorrentStatus::Finished)
            && torrent.files_selected.is_none()
            && torrent.downloads.is_empty()
        {
            debug!("Selecting files {}", torrent.to_log());
            self.store.select_files(torrent.id).await?;
            self.store.update_files_selected(torrent.id, Utc::now()).await?;
        }

        // The provider finished; create the host-side download rows.
        if torrent.status == TorrentStatus::Finished
            && torrent.downloads.is_empty()
            && torrent.files_selected.is_some()
            && torrent.host_download_action == HostDownloadAction::DownloadAll
        {
            debug!("Creating downloads {}", torrent.to_log());
            self.store.create_downloads(torrent.id).await?;
        }

        self.check_completion(torrent).await?;

        Ok(())
    }

    /// Admit queued downloads in queue order, up to the registry ceiling.
    /// Launches within the torrent run concurrently and are awaited before
    /// returning; remote ids and launch errors are flushed as bulk updates.
    async fn start_queued_downloads(&self, torrent: &Torrent) -> Result<(), OrchestratorError> {
        let mut queued: Vec<&Download> = torrent
            .downloads
            .iter()
            .filter(|d| {
                d.completed.is_none()
                    && d.download_queued.is_some()
                    && d.download_started.is_none()
                    && d.error.is_none()
            })
            .collect();
        queued.sort_by_key(|d| d.download_queued);

        if queued.is_empty() {
            return Ok(());
        }

        let mut remote_ids: HashMap<Uuid, String> = HashMap::new();
        let mut launch_errors: HashMap<Uuid, String> = HashMap::new();
        let mut launches: JoinSet<(Uuid, Option<String>, Option<String>, Option<String>)> =
            JoinSet::new();

        for download in queued {
            if self.downloads.at_capacity().await {
                debug!(
                    "Not starting download, the max number of downloads are active {} {}",
                    download.to_log(),
                    torrent.to_log()
                );
                break;
            }

            if self.downloads.contains(download.id).await {
                debug!(
                    "Not starting download, already active {} {}",
                    download.to_log(),
                    torrent.to_log()
                );
                break;
            }

            // Resolve the link if it was never unrestricted. Failure is
            // terminal for this download only; the loop moves on.
            let mut download = download.clone();
            if download.link.is_none() {
                debug!("Unrestricting link {} {}", download.to_log(), torrent.to_log());
                match self.store.unrestrict_link(download.id).await {
                    Ok(link) => download.link = Some(link),
                    Err(e) => {
                        error!("Cannot unrestrict link: {e} {}", download.to_log());
                        self.store
                            .update_download_error(download.id, e.to_string())
                            .await?;
                        self.store
                            .update_download_completed(download.id, Some(Utc::now()))
                            .await?;
                        continue;
                    }
                }
            }

            debug!(
                "Marking download as started {} {}",
                download.to_log(),
                torrent.to_log()
            );
            self.store
                .update_download_started(download.id, Some(Utc::now()))
                .await?;

            let download_path = self.torrent_download_path(torrent);
            debug!(
                "Setting download path to {} {}",
                download_path.display(),
                download.to_log()
            );

            let downloader = match self.build_downloader(&download, torrent, &download_path) {
                Ok(downloader) => Arc::new(downloader),
                Err(e) => {
                    self.store
                        .update_download_error(download.id, e.to_string())
                        .await?;
                    self.store
                        .update_download_completed(download.id, Some(Utc::now()))
                        .await?;
                    continue;
                }
            };

            let worker = Arc::new(DownloadWorker::new(download.id, downloader));
            if !self.downloads.try_add(download.id, Arc::clone(&worker)).await {
                continue;
            }

            debug!("Starting download {} {}", download.to_log(), torrent.to_log());
            metrics::DOWNLOADS_STARTED.inc();

            let id = download.id;
            let prior_remote = download.remote_id.clone();
            launches.spawn(async move {
                let remote_id = worker.launch().await;
                let error = worker.error().await;
                (id, prior_remote, remote_id, error)
            });

            // Courtesy gap between launches so the provider API is not
            // hammered.
            tokio::time::sleep(Duration::from_millis(self.config.orchestrator.start_delay_ms))
                .await;
        }

        while let Some(result) = launches.join_next().await {
            let Ok((id, prior_remote, remote_id, error)) = result else {
                continue;
            };
            match remote_id {
                Some(remote) if prior_remote.as_deref() != Some(remote.as_str()) => {
                    debug!("Download {id} received remote id {remote}");
                    remote_ids.insert(id, remote);
                }
                Some(_) => {}
                None => {
                    debug!("Download {id} did not receive a remote id");
                    launch_errors.insert(
                        id,
                        error.unwrap_or_else(|| "download failed to start".to_string()),
                    );
                }
            }
        }

        if !remote_ids.is_empty() {
            self.store.update_remote_ids(&remote_ids).await?;
        }
        if !launch_errors.is_empty() {
            self.store.update_download_errors(&launch_errors).await?;
        }

        Ok(())
    }

    /// Admit queued unpacks up to the registry ceiling. Non-archives are
    /// marked fully complete here; the symlink backend never unpacks.
    async fn start_queued_unpacks(&self, torrent: &Torrent) -> Result<(), OrchestratorError> {
        let mut queued: Vec<&Download> = torrent
            .downloads
            .iter()
            .filter(|d| {
                d.completed.is_none()
                    && d.unpacking_queued.is_some()
                    && d.unpacking_started.is_none()
                    && d.error.is_none()
            })
            .collect();
        queued.sort_by_key(|d| d.download_queued);

        for download in queued {
            debug!("Evaluating unpack {} {}", download.to_log(), torrent.to_log());

            if download.link.is_none() {
                debug!("No download link found {} {}", download.to_log(), torrent.to_log());
                self.store
                    .update_download_error(download.id, "Download link cannot be empty".to_string())
                    .await?;
                self.store
                    .update_download_completed(download.id, Some(Utc::now()))
                    .await?;
                continue;
            }

            let file_name = download.file_name().unwrap_or_default();
            debug!("Found file name {file_name} {}", download.to_log());

            if !is_archive_file(&file_name) {
                debug!(
                    "No need to unpack, marking as complete {} {}",
                    download.to_log(),
                    torrent.to_log()
                );
                let now = Utc::now();
                self.store
                    .update_unpacking_started(download.id, Some(now))
                    .await?;
                self.store
                    .update_unpacking_finished(download.id, Some(now))
                    .await?;
                self.store
                    .update_download_completed(download.id, Some(now))
                    .await?;
                continue;
            }

            // Never extract through a symlinked mount.
            if self.config.downloader.backend == DownloaderBackend::Symlink {
                debug!("Refusing to unpack with the symlink backend {}", download.to_log());
                self.store
                    .update_download_error(
                        download.id,
                        "Will not unpack with the symlink backend".to_string(),
                    )
                    .await?;
                self.store
                    .update_download_completed(download.id, Some(Utc::now()))
                    .await?;
                continue;
            }

            if self.unpacks.at_capacity().await {
                debug!(
                    "Not starting unpack, the max number of unpacks are active {} {}",
                    download.to_log(),
                    torrent.to_log()
                );
                continue;
            }

            if self.unpacks.contains(download.id).await {
                debug!(
                    "Not starting unpack, already active {} {}",
                    download.to_log(),
                    torrent.to_log()
                );
                continue;
            }

            self.store
                .update_unpacking_started(download.id, Some(Utc::now()))
                .await?;

            let download_path = self.torrent_download_path(torrent);
            debug!(
                "Setting unpack path to {} {}",
                download_path.display(),
                download.to_log()
            );

            let target_dir = download_path.join(&torrent.name);
            let archive = target_dir.join(&file_name);

            let worker = Arc::new(UnpackWorker::spawn(download.id, archive, target_dir));
            if self.unpacks.try_add(download.id, worker).await {
                debug!("Starting unpack {} {}", download.to_log(), torrent.to_log());
                metrics::UNPACKS_STARTED.inc();
            }
        }

        Ok(())
    }

    /// Mark the torrent complete once every download is, then run the
    /// configured finalize action and the post-complete hook.
    async fn check_completion(&self, torrent: &Torrent) -> Result<(), OrchestratorError> {
        let downloads_none = torrent.status == TorrentStatus::Finished
            && torrent.host_download_action == HostDownloadAction::DownloadNone;
        if torrent.downloads.is_empty() && !downloads_none {
            return Ok(());
        }

        let complete_count = torrent
            .downloads
            .iter()
            .filter(|d| d.completed.is_some())
            .count();
        let total_bytes: u64 = torrent.downloads.iter().map(|d| d.bytes_total).sum();
        let done_bytes: u64 = torrent.downloads.iter().map(|d| d.bytes_done).sum();
        let percent = if total_bytes > 0 {
            (done_bytes as f64 / total_bytes as f64 * 100.0) as u32
        } else {
            0
        };

        if complete_count == torrent.downloads.len() {
            info!("All downloads complete, marking torrent as complete {}", torrent.to_log());
            metrics::TORRENTS_COMPLETED.inc();
            self.store
                .update_torrent_complete(torrent.id, None, Utc::now())
                .await?;

            self.run_finished_action(torrent).await?;

            if let Err(e) = self.store.run_post_complete_hook(torrent.id).await {
                // The torrent is already complete; a hook failure must not
                // undo that.
                error!("Unable to run post-complete hook: {e} {}", torrent.to_log());
            }
        } else {
            debug!(
                "Waiting for downloads to complete. {complete_count}/{} complete ({percent}%) {}",
                torrent.downloads.len(),
                torrent.to_log()
            );
        }

        Ok(())
    }

    async fn run_finished_action(&self, torrent: &Torrent) -> Result<(), OrchestratorError> {
        match torrent.finished_action {
            FinishedAction::RemoveAll => {
                debug!(
                    "Removing torrent from provider and client, keeping files {}",
                    torrent.to_log()
                );
                self.store.delete_torrent(torrent.id, true, true, false).await?;
            }
            FinishedAction::RemoveProvider => {
                debug!("Removing torrent from provider, keeping files {}", torrent.to_log());
                self.store.delete_torrent(torrent.id, false, true, false).await?;
            }
            FinishedAction::RemoveClient => {
                debug!("Removing torrent from client, keeping files {}", torrent.to_log());
                self.store.delete_torrent(torrent.id, true, false, false).await?;
            }
            FinishedAction::None => {
                debug!("Leaving torrent in place {}", torrent.to_log());
            }
        }
        Ok(())
    }

    /// Base download path plus the torrent's category subfolder.
    fn torrent_download_path(&self, torrent: &Torrent) -> PathBuf {
        let mut path = self.config.general.download_path.clone();
        if let Some(category) = torrent.category.as_deref().filter(|c| !c.trim().is_empty()) {
            path = path.join(category);
        }
        path
    }

    /// Construct the configured backend for one download.
    fn build_downloader(
        &self,
        download: &Download,
        torrent: &Torrent,
        download_path: &Path,
    ) -> Result<Downloader, OrchestratorError> {
        let link = download
            .link
            .clone()
            .ok_or_else(|| OrchestratorError::MissingData {
                id: download.id,
                what: "link".to_string(),
            })?;
        let file_name = download
            .file_name()
            .ok_or_else(|| OrchestratorError::MissingData {
                id: download.id,
                what: "file name derivable from link".to_string(),
            })?;
        let dest_dir = download_path.join(&torrent.name);

        match self.config.downloader.backend {
            DownloaderBackend::Aria2 => {
                let client = self.aria2.clone().ok_or_else(|| {
                    OrchestratorError::BackendMisconfigured(
                        "aria2 backend selected but no [downloader.aria2] section".to_string(),
                    )
                })?;
                Ok(Downloader::Aria2(Aria2Downloader::new(
                    client, link, dest_dir, file_name,
                )))
            }
            DownloaderBackend::Symlink => {
                let config = self.config.downloader.symlink.clone().ok_or_else(|| {
                    OrchestratorError::BackendMisconfigured(
                        "symlink backend selected but no [downloader.symlink] section".to_string(),
                    )
                })?;
                let dest_path = dest_dir.join(&file_name);
                let files = torrent.files.iter().map(|f| f.path.clone()).collect();
                Ok(Downloader::Symlink(SymlinkDownloader::new(
                    config,
                    dest_path,
                    torrent.name.clone(),
                    files,
                )))
            }
        }
    }

    /// Push a post-tick state snapshot to the realtime collaborator.
    async fn push_snapshot(&self) -> Result<(), OrchestratorError> {
        let Some(callback) = &self.snapshot_callback else {
            return Ok(());
        };

        let torrents = self.store.get_torrents().await?;
        let snapshot = OrchestratorSnapshot {
            active_downloads: self.downloads.len().await,
            active_unpacks: self.unpacks.len().await,
            torrents: torrents
                .iter()
                .map(|t| {
                    let total_bytes: u64 = t.downloads.iter().map(|d| d.bytes_total).sum();
                    let done_bytes: u64 = t.downloads.iter().map(|d| d.bytes_done).sum();
                    TorrentProgress {
                        torrent_id: t.id,
                        name: t.name.clone(),
                        completed: t.completed.is_some(),
                        downloads_complete: t
                            .downloads
                            .iter()
                            .filter(|d| d.completed.is_some())
                            .count(),
                        downloads_total: t.downloads.len(),
                        percent: if total_bytes > 0 {
                            (done_bytes as f64 / total_bytes as f64 * 100.0) as u32
                        } else {
                            0
                        },
                    }
                })
                .collect(),
        };
        callback(snapshot);
        Ok(())
    }
}
