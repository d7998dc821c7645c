//! Symlink downloader backend.
//!
//! Assumes a separately-mounted remote filesystem materializes provider files
//! on its own schedule. Instead of transferring bytes, this backend polls the
//! mount until the expected file appears and links it into place.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SymlinkConfig;
use crate::unpack::is_archive_file;

use super::types::{CompletionSlot, DownloadProgress, DownloaderError};

#[cfg(unix)]
use tokio::fs::symlink;
#[cfg(windows)]
use tokio::fs::symlink_file as symlink;

/// Resolves one file out of the mounted remote filesystem.
pub struct SymlinkDownloader {
    config: SymlinkConfig,
    /// Full path the file is expected to end up at.
    dest_path: PathBuf,
    /// Release name, used as a directory-name candidate and for the mirror
    /// layout and side-car file.
    torrent_name: String,
    /// Relative per-file paths of the torrent, for the mirror layout.
    torrent_files: Vec<String>,
    completion: CompletionSlot,
    progress: watch::Sender<DownloadProgress>,
    cancelled: AtomicBool,
}

impl SymlinkDownloader {
    pub fn new(
        config: SymlinkConfig,
        dest_path: PathBuf,
        torrent_name: String,
        torrent_files: Vec<String>,
    ) -> Self {
        let (progress, _) = watch::channel(DownloadProgress::default());
        Self {
            config,
            dest_path,
            torrent_name,
            torrent_files,
            completion: CompletionSlot::new(),
            progress,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn completion(&self) -> CompletionSlot {
        self.completion.clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.subscribe()
    }

    /// Drive discovery to completion: poll the mount for the expected file,
    /// link it into place, then handle the optional mirror placement.
    ///
    /// Unlike the agent backend this runs the entire transfer before
    /// returning; on success the completion slot is set and the resolved
    /// source path doubles as the remote id.
    pub async fn start(&self) -> Result<Option<String>, DownloaderError> {
        let file_name = self
            .dest_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                DownloaderError::Internal(format!(
                    "destination path has no file name: {}",
                    self.dest_path.display()
                ))
            })?;

        if is_archive_file(&file_name) {
            return Err(DownloaderError::UnsupportedArchive(file_name));
        }

        // This backend has no real transfer progress to report.
        let _ = self.progress.send(DownloadProgress::default());

        let candidates = self.candidate_directories(&file_name);

        let mut found = None;
        for attempt in 0..self.config.attempts {
            if self.cancelled.load(Ordering::Relaxed) {
                return Err(DownloaderError::Cancelled);
            }

            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.poll_delay_ms)).await;
            }

            self.run_refresh_command().await;

            debug!(
                "Searching {} for {file_name} (attempt {}/{})",
                self.config.mount_path.display(),
                attempt + 1,
                self.config.attempts
            );

            match self.locate(&candidates, &file_name).await {
                Ok(Some(path)) => {
                    found = Some(path);
                    break;
                }
                Ok(None) => {}
                Err(e) => warn!("Error while scanning mount: {e}"),
            }
        }

        let source = found.ok_or_else(|| DownloaderError::SourceNotFound(file_name.clone()))?;

        self.link_into_place(&source).await?;

        // Secondary placement never fails the primary download.
        if self.config.mirror_path.is_some() {
            if let Err(e) = self.mirror_placement(&source, &file_name).await {
                warn!(
                    "Mirror placement failed for {file_name}: {e}, primary link is in place"
                );
            }
            self.relocate_sidecar().await;
        }

        self.completion.succeed(source.clone()).await;

        Ok(Some(source.display().to_string()))
    }

    pub async fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Pausing a mount poll is meaningless; a no-op is a valid implementation.
    pub async fn pause(&self) {}

    pub async fn resume(&self) {}

    /// Directory names the file is expected under, in preference order.
    fn candidate_directories(&self, file_name: &str) -> Vec<String> {
        let file_stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());
        let dir_name = self.torrent_name.clone();
        let dir_stem = Path::new(&dir_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());

        let mut candidates = Vec::new();
        for candidate in [
            file_stem,
            dir_stem,
            Some(file_name.to_string()),
            Some(dir_name),
        ]
        .into_iter()
        .flatten()
        {
            if !candidate.is_empty() && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    /// Scan the mount root for the expected file.
    ///
    /// Directories whose name matches a candidate are searched first; within
    /// each group the most recently created directory wins (configurable),
    /// which disambiguates duplicate releases.
    async fn locate(
        &self,
        candidates: &[String],
        file_name: &str,
    ) -> Result<Option<PathBuf>, DownloaderError> {
        let mut preferred = Vec::new();
        let mut rest = Vec::new();

        let mut entries = fs::read_dir(&self.config.mount_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let created = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.created().or_else(|_| m.modified()).ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            if candidates.contains(&name) {
                preferred.push((entry.path(), created));
            } else {
                rest.push((entry.path(), created));
            }
        }

        if self.config.prefer_newest {
            preferred.sort_by(|a, b| b.1.cmp(&a.1));
            rest.sort_by(|a, b| b.1.cmp(&a.1));
        }

        for (dir, _) in preferred.into_iter().chain(rest) {
            let candidate = dir.join(file_name);
            if fs::symlink_metadata(&candidate).await.is_ok() {
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }

    /// Best-effort nudge for mounts that cache directory listings.
    async fn run_refresh_command(&self) {
        let Some(command) = self.config.refresh_command.as_deref() else {
            return;
        };

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => {}
            Ok(Ok(output)) => warn!(
                "Mount refresh command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Ok(Err(e)) => warn!("Mount refresh command failed to run: {e}"),
            Err(_) => warn!("Mount refresh command timed out"),
        }
    }

    /// Create the primary symlink and verify it actually exists afterwards.
    /// Symlink creation can silently no-op on some filesystems.
    async fn link_into_place(&self, source: &Path) -> Result<(), DownloaderError> {
        if let Some(parent) = self.dest_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        remove_stale_link(&self.dest_path).await?;
        symlink(source, &self.dest_path).await?;

        if fs::symlink_metadata(&self.dest_path).await.is_err() {
            return Err(DownloaderError::Internal(format!(
                "symlink was not created at {}",
                self.dest_path.display()
            )));
        }

        info!(
            "Created symlink {} -> {}",
            self.dest_path.display(),
            source.display()
        );
        Ok(())
    }

    /// Create the secondary symlink under the mirror root, reproducing the
    /// torrent's relative per-file layout.
    async fn mirror_placement(
        &self,
        source: &Path,
        file_name: &str,
    ) -> Result<(), DownloaderError> {
        let Some(mirror_root) = self.config.mirror_path.as_deref() else {
            return Ok(());
        };

        let link_path = match self.torrent_files.iter().find(|p| {
            Path::new(p.as_str())
                .file_name()
                .is_some_and(|n| n.to_string_lossy() == file_name)
        }) {
            Some(relative) => mirror_root.join(relative),
            // No file list to derive a layout from: nest under the release
            // name unless the file is the release itself.
            None if self.torrent_name != file_name => {
                mirror_root.join(&self.torrent_name).join(file_name)
            }
            None => mirror_root.join(file_name),
        };

        if let Some(parent) = link_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        remove_stale_link(&link_path).await?;
        symlink(source, &link_path).await?;

        if fs::symlink_metadata(&link_path).await.is_err() {
            return Err(DownloaderError::Internal(format!(
                "mirror symlink was not created at {}",
                link_path.display()
            )));
        }

        info!(
            "Created mirror symlink {} -> {}",
            link_path.display(),
            source.display()
        );
        Ok(())
    }

    /// Move the staged `<torrent>.torrent` side-car into the mirror root.
    /// Best-effort; the download has already succeeded by the time this runs.
    async fn relocate_sidecar(&self) {
        let (Some(staging), Some(mirror_root)) = (
            self.config.staging_path.as_deref(),
            self.config.mirror_path.as_deref(),
        ) else {
            return;
        };

        let sidecar = format!("{}.torrent", self.torrent_name);
        let source = staging.join(&sidecar);
        if fs::symlink_metadata(&source).await.is_err() {
            return;
        }

        let target = mirror_root.join(&sidecar);
        if fs::symlink_metadata(&target).await.is_ok() {
            if let Err(e) = fs::remove_file(&target).await {
                warn!("Failed to replace existing side-car {}: {e}", target.display());
                return;
            }
        }

        match fs::rename(&source, &target).await {
            Ok(()) => info!("Moved side-car {sidecar} into mirror root"),
            Err(e) => warn!("Failed to move side-car {sidecar}: {e}"),
        }
    }
}

/// Remove a leftover symlink from an earlier attempt so re-linking succeeds.
async fn remove_stale_link(path: &Path) -> Result<(), DownloaderError> {
    if let Ok(metadata) = fs::symlink_metadata(path).await {
        if metadata.file_type().is_symlink() {
            fs::remove_file(path).await?;
        }
    }
    Ok(())
}
