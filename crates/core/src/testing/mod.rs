//! Testing utilities shared by unit and integration tests.
//!
//! The in-memory store ([`crate::torrent::MemoryTorrentStore`]) doubles as
//! the test double for the repository seam; this module supplies the record
//! fixtures that go into it.
//!
//! # Example
//!
//! ```rust,ignore
//! use drover_core::testing::fixtures;
//!
//! let torrent = fixtures::torrent("Some.Show.S01");
//! let download = fixtures::queued_download(torrent.id, "https://host/file.mkv");
//! ```

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::torrent::{
        Download, FinishedAction, HostDownloadAction, Torrent, TorrentStatus,
    };

    /// Create a finished provider torrent with reasonable defaults and no
    /// downloads.
    pub fn torrent(name: &str) -> Torrent {
        Torrent {
            id: Uuid::new_v4(),
            remote_id: format!("remote-{}", name.to_lowercase()),
            hash: "0123456789abcdef0123456789abcdef01234567".to_string(),
            name: name.to_string(),
            category: None,
            status: TorrentStatus::Finished,
            status_raw: "downloaded".to_string(),
            files_selected: Some(Utc::now()),
            added: Utc::now(),
            completed: None,
            retry: None,
            retry_count: 0,
            torrent_retry_attempts: 1,
            download_retry_attempts: 0,
            lifetime: 0,
            delete_on_error: 0,
            finished_action: FinishedAction::None,
            host_download_action: HostDownloadAction::DownloadAll,
            error: None,
            files: vec![],
            downloads: vec![],
        }
    }

    /// Create a download already queued for transfer, with its link resolved.
    pub fn queued_download(torrent_id: Uuid, link: &str) -> Download {
        Download {
            id: Uuid::new_v4(),
            torrent_id,
            remote_id: None,
            link: Some(link.to_string()),
            download_queued: Some(Utc::now()),
            download_started: None,
            download_finished: None,
            unpacking_queued: None,
            unpacking_started: None,
            unpacking_finished: None,
            completed: None,
            error: None,
            retry_count: 0,
            bytes_total: 100 * 1024 * 1024,
            bytes_done: 0,
            speed: 0,
        }
    }

    /// Create a download that finished transferring and awaits unpack
    /// evaluation.
    pub fn unpack_queued_download(torrent_id: Uuid, link: &str) -> Download {
        let now = Utc::now();
        let mut download = queued_download(torrent_id, link);
        download.download_started = Some(now);
        download.download_finished = Some(now);
        download.unpacking_queued = Some(now);
        download.bytes_done = download.bytes_total;
        download
    }

    /// Create a fully completed download.
    pub fn completed_download(torrent_id: Uuid, link: &str) -> Download {
        let now = Utc::now();
        let mut download = unpack_queued_download(torrent_id, link);
        download.unpacking_started = Some(now);
        download.unpacking_finished = Some(now);
        download.completed = Some(now);
        download
    }
}
