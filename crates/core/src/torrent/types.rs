//! Torrent and download records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provider-side status of a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentStatus {
    /// The provider is waiting for a file selection before it starts.
    WaitingForFileSelection,
    /// The provider is fetching the torrent into its own storage.
    Downloading,
    /// The provider is post-processing (e.g. compressing, uploading).
    Processing,
    /// The provider has the files ready for retrieval.
    Finished,
    /// The provider reported an error.
    Error,
    /// Status string the provider sent was not recognized.
    Unknown,
}

impl TorrentStatus {
    /// Returns the string representation for API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentStatus::WaitingForFileSelection => "waiting_for_file_selection",
            TorrentStatus::Downloading => "downloading",
            TorrentStatus::Processing => "processing",
            TorrentStatus::Finished => "finished",
            TorrentStatus::Error => "error",
            TorrentStatus::Unknown => "unknown",
        }
    }
}

/// What to do with the provider/client records once every download completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishedAction {
    /// Leave everything in place.
    None,
    /// Remove the torrent from the local client only.
    RemoveClient,
    /// Remove the torrent from the provider only.
    RemoveProvider,
    /// Remove the torrent from both the provider and the local client.
    RemoveAll,
}

/// Whether provider files are downloaded to the host at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostDownloadAction {
    /// Create a download for every selected file.
    DownloadAll,
    /// Track the torrent on the provider but keep nothing locally.
    DownloadNone,
}

/// A file the provider reports as part of the torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentFile {
    /// Path relative to the torrent root.
    pub path: String,
    /// Size in bytes.
    pub bytes: u64,
}

/// A torrent tracked by the orchestrator.
///
/// A torrent with `completed` set is terminal: the tick loop only ever
/// touches it again for error expiry and deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Torrent {
    pub id: Uuid,
    /// Identifier of the torrent on the provider side.
    pub remote_id: String,
    /// Info hash, lowercase hex.
    pub hash: String,
    /// Display name, usually the release name.
    pub name: String,
    /// Category used as a subfolder under the download path.
    pub category: Option<String>,
    /// Parsed provider status.
    pub status: TorrentStatus,
    /// Raw provider status string, surfaced verbatim in errors and UI.
    pub status_raw: String,
    /// When files were selected on the provider.
    pub files_selected: Option<DateTime<Utc>>,
    pub added: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
    /// Set when the torrent is flagged for a whole-torrent retry.
    pub retry: Option<DateTime<Utc>>,
    pub retry_count: u32,
    /// Cap on whole-torrent retries.
    pub torrent_retry_attempts: u32,
    /// Cap on per-download retries.
    pub download_retry_attempts: u32,
    /// Minutes before a torrent with no downloads is errored out. 0 = unlimited.
    pub lifetime: i64,
    /// Minutes an errored torrent lingers before deletion. 0 = never delete.
    pub delete_on_error: i64,
    pub finished_action: FinishedAction,
    pub host_download_action: HostDownloadAction,
    pub error: Option<String>,
    /// Files the provider reported for this torrent.
    pub files: Vec<TorrentFile>,
    /// Downloads owned by this torrent, ordered by queue time.
    pub downloads: Vec<Download>,
}

impl Torrent {
    /// One-line identification for log messages.
    pub fn to_log(&self) -> String {
        format!("[torrent {} ({})]", self.name, self.id)
    }
}

/// A single file transfer owned by a torrent.
///
/// Timestamps only move forward: queued <= started <= finished <= completed.
/// Once both `error` and `completed` are set the download is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Download {
    pub id: Uuid,
    pub torrent_id: Uuid,
    /// Backend-specific job identifier (aria2 gid, resolved symlink path).
    pub remote_id: Option<String>,
    /// Unrestricted, directly fetchable URL. None until unrestricted.
    pub link: Option<String>,
    pub download_queued: Option<DateTime<Utc>>,
    pub download_started: Option<DateTime<Utc>>,
    pub download_finished: Option<DateTime<Utc>>,
    pub unpacking_queued: Option<DateTime<Utc>>,
    pub unpacking_started: Option<DateTime<Utc>>,
    pub unpacking_finished: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    /// Error text surfaced verbatim from the failing call.
    pub error: Option<String>,
    pub retry_count: u32,
    pub bytes_total: u64,
    pub bytes_done: u64,
    /// Transfer rate in bytes/second, display only.
    pub speed: u64,
}

impl Download {
    /// One-line identification for log messages.
    pub fn to_log(&self) -> String {
        format!("[download {}]", self.id)
    }

    /// File name derived from the last segment of the unrestricted link,
    /// percent-decoded.
    pub fn file_name(&self) -> Option<String> {
        let link = self.link.as_deref()?;
        let path = link.split('?').next().unwrap_or(link);
        let segment = path.rsplit('/').next()?;
        if segment.is_empty() {
            return None;
        }
        Some(
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string()),
        )
    }
}
