//! Tick lifecycle integration tests.
//!
//! These tests drive the orchestrator tick by tick against the in-memory
//! store and real symlink/unpack workers on temp directories, verifying the
//! download and torrent state machines end to end.

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use drover_core::config::{
    Aria2Config, Config, DownloaderBackend, DownloaderConfig, GeneralConfig, ProviderConfig,
    SymlinkConfig,
};
use drover_core::testing::fixtures;
use drover_core::{
    FinishedAction, HostDownloadAction, MemoryTorrentStore, Orchestrator, OrchestratorConfig,
    TorrentStatus, TorrentStore,
};

/// Test helper holding the store and the temp directories backing the mount
/// and download paths.
struct TestHarness {
    store: Arc<MemoryTorrentStore>,
    mount: TempDir,
    downloads_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryTorrentStore::new()),
            mount: TempDir::new().expect("Failed to create mount dir"),
            downloads_dir: TempDir::new().expect("Failed to create downloads dir"),
        }
    }

    fn symlink_config(&self, download_limit: usize, unpack_limit: usize) -> Config {
        Config {
            provider: ProviderConfig {
                api_key: "test-key".to_string(),
            },
            general: GeneralConfig {
                download_path: self.downloads_dir.path().to_path_buf(),
                download_limit,
                unpack_limit,
            },
            downloader: DownloaderConfig {
                backend: DownloaderBackend::Symlink,
                aria2: None,
                symlink: Some(SymlinkConfig {
                    mount_path: self.mount.path().to_path_buf(),
                    attempts: 1,
                    poll_delay_ms: 10,
                    prefer_newest: true,
                    mirror_path: None,
                    staging_path: None,
                    refresh_command: None,
                }),
            },
            orchestrator: OrchestratorConfig {
                enabled: false,
                tick_interval_ms: 1000,
                start_delay_ms: 1,
            },
        }
    }

    /// aria2 config pointed at a dead endpoint; used for tests that never
    /// launch an agent transfer.
    fn aria2_config(&self, download_limit: usize, unpack_limit: usize) -> Config {
        Config {
            provider: ProviderConfig {
                api_key: "test-key".to_string(),
            },
            general: GeneralConfig {
                download_path: self.downloads_dir.path().to_path_buf(),
                download_limit,
                unpack_limit,
            },
            downloader: DownloaderConfig {
                backend: DownloaderBackend::Aria2,
                aria2: Some(Aria2Config {
                    url: "http://127.0.0.1:1/jsonrpc".to_string(),
                    secret: None,
                    timeout_secs: 1,
                }),
                symlink: None,
            },
            orchestrator: OrchestratorConfig {
                enabled: false,
                tick_interval_ms: 1000,
                start_delay_ms: 1,
            },
        }
    }

    fn orchestrator(&self, config: Config) -> Orchestrator {
        Orchestrator::new(config, Arc::clone(&self.store) as Arc<dyn TorrentStore>)
    }

    /// Materialize a file in the mount, as the remote filesystem would.
    fn add_mount_file(&self, dir: &str, file: &str) {
        let dir_path = self.mount.path().join(dir);
        std::fs::create_dir_all(&dir_path).expect("Failed to create mount subdir");
        std::fs::write(dir_path.join(file), b"content").expect("Failed to write mount file");
    }

    /// Tick until the torrent completes or we run out of ticks.
    async fn tick_until_complete(
        &self,
        orchestrator: &Orchestrator,
        torrent_id: Uuid,
        max_ticks: usize,
    ) -> bool {
        for _ in 0..max_ticks {
            orchestrator.tick().await.expect("tick failed");
            if let Some(torrent) = self.store.torrent(torrent_id).await {
                if torrent.completed.is_some() {
                    return true;
                }
            } else {
                // Deleted counts as terminal too.
                return true;
            }
        }
        false
    }
}

#[tokio::test]
async fn test_download_limit_admits_one_per_tick() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.symlink_config(1, 1));

    let mut torrent = fixtures::torrent("Release");
    let torrent_id = torrent.id;

    let mut first = fixtures::queued_download(torrent_id, "https://host.example/dl/one.mkv");
    first.download_queued = Some(Utc::now() - chrono::Duration::seconds(10));
    let first_id = first.id;
    let second = fixtures::queued_download(torrent_id, "https://host.example/dl/two.mkv");
    let second_id = second.id;
    torrent.downloads = vec![first, second];
    harness.store.insert_torrent(torrent).await;

    harness.add_mount_file("Release", "one.mkv");
    harness.add_mount_file("Release", "two.mkv");

    orchestrator.tick().await.unwrap();

    // Only the earlier-queued download was admitted; the registry ceiling
    // blocked the second.
    let first = harness.store.download(first_id).await.unwrap();
    let second = harness.store.download(second_id).await.unwrap();
    assert!(first.download_started.is_some());
    assert!(second.download_started.is_none());
    assert_eq!(orchestrator.active_downloads().len().await, 1);

    // Next tick reaps the finished download and admits the second.
    orchestrator.tick().await.unwrap();
    let second = harness.store.download(second_id).await.unwrap();
    assert!(second.download_started.is_some());
}

#[tokio::test]
async fn test_symlink_download_full_lifecycle() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.symlink_config(2, 1));

    let mut torrent = fixtures::torrent("Some.Show.S01E01");
    torrent.category = Some("tv".to_string());
    let torrent_id = torrent.id;
    let download = fixtures::queued_download(torrent_id, "https://host.example/dl/episode.mkv");
    let download_id = download.id;
    torrent.downloads = vec![download];
    harness.store.insert_torrent(torrent).await;

    harness.add_mount_file("Some.Show.S01E01", "episode.mkv");

    assert!(
        harness
            .tick_until_complete(&orchestrator, torrent_id, 5)
            .await
    );

    let download = harness.store.download(download_id).await.unwrap();
    assert!(download.download_started.is_some());
    assert!(download.download_finished.is_some());
    assert!(download.unpacking_queued.is_some());
    assert!(download.unpacking_started.is_some());
    assert!(download.unpacking_finished.is_some());
    assert!(download.completed.is_some());
    assert!(download.error.is_none());
    // The resolved mount path doubles as the remote id.
    assert!(download.remote_id.unwrap().contains("episode.mkv"));

    // An .mkv never enters the unpack registry.
    assert_eq!(orchestrator.active_unpacks().len().await, 0);

    // The primary symlink sits under download_path/category/torrent/file.
    let expected = harness
        .downloads_dir
        .path()
        .join("tv")
        .join("Some.Show.S01E01")
        .join("episode.mkv");
    assert!(std::fs::symlink_metadata(&expected)
        .unwrap()
        .file_type()
        .is_symlink());
}

#[tokio::test]
async fn test_download_retries_then_terminal_error() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.symlink_config(2, 1));

    let mut torrent = fixtures::torrent("Missing.Release");
    torrent.download_retry_attempts = 1;
    let torrent_id = torrent.id;
    let download = fixtures::queued_download(torrent_id, "https://host.example/dl/gone.mkv");
    let download_id = download.id;
    torrent.downloads = vec![download];
    harness.store.insert_torrent(torrent).await;
    // Nothing in the mount: every attempt fails with source-not-found.

    // Tick 1: first attempt launches and fails.
    orchestrator.tick().await.unwrap();
    let d = harness.store.download(download_id).await.unwrap();
    assert_eq!(d.retry_count, 0);
    assert!(d.error.is_some());

    // Tick 2: the error is reaped, the download re-queued and retried.
    orchestrator.tick().await.unwrap();
    let d = harness.store.download(download_id).await.unwrap();
    assert_eq!(d.retry_count, 1);
    assert!(d.completed.is_none());

    // Tick 3: retry cap reached, terminal.
    orchestrator.tick().await.unwrap();
    let d = harness.store.download(download_id).await.unwrap();
    assert_eq!(d.retry_count, 1);
    assert!(d.completed.is_some());
    assert!(d.error.unwrap().contains("source file not found"));

    // The torrent completes (with the failed download counted).
    let torrent = harness.store.torrent(torrent_id).await.unwrap();
    assert!(torrent.completed.is_some());
}

#[tokio::test]
async fn test_unrestrict_failure_is_per_download() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.symlink_config(2, 1));

    let mut torrent = fixtures::torrent("Release");
    let torrent_id = torrent.id;

    let mut failing = fixtures::queued_download(torrent_id, "unused");
    failing.link = None;
    failing.download_queued = Some(Utc::now() - chrono::Duration::seconds(10));
    let failing_id = failing.id;

    let ok = fixtures::queued_download(torrent_id, "https://host.example/dl/file.mkv");
    let ok_id = ok.id;
    torrent.downloads = vec![failing, ok];
    harness.store.insert_torrent(torrent).await;
    harness
        .store
        .fail_unrestrict(failing_id, "hoster unavailable")
        .await;
    harness.add_mount_file("Release", "file.mkv");

    orchestrator.tick().await.unwrap();

    // The unrestrict failure is terminal for that download only.
    let failing = harness.store.download(failing_id).await.unwrap();
    assert_eq!(failing.error.as_deref(), Some("provider error: hoster unavailable"));
    assert!(failing.completed.is_some());

    // The admission loop moved on to the next queued download.
    let ok = harness.store.download(ok_id).await.unwrap();
    assert!(ok.download_started.is_some());
}

#[tokio::test]
async fn test_lifetime_expiry_marks_error_and_disables_retry() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Stale.Release");
    torrent.lifetime = 10;
    torrent.added = Utc::now() - chrono::Duration::minutes(11);
    torrent.torrent_retry_attempts = 3;
    let torrent_id = torrent.id;
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    let torrent = harness.store.torrent(torrent_id).await.unwrap();
    assert!(torrent.completed.is_some());
    assert!(torrent.error.unwrap().contains("lifetime of 10 minutes"));
    // Retry counter maxed out so the error is not auto-retried.
    assert_eq!(torrent.retry_count, 3);
    assert!(torrent.retry.is_none());
}

#[tokio::test]
async fn test_lifetime_not_expired_is_untouched() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Fresh.Release");
    torrent.lifetime = 10;
    torrent.added = Utc::now() - chrono::Duration::minutes(5);
    torrent.status = TorrentStatus::Downloading;
    let torrent_id = torrent.id;
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    let torrent = harness.store.torrent(torrent_id).await.unwrap();
    assert!(torrent.completed.is_none());
    assert!(torrent.error.is_none());
}

#[tokio::test]
async fn test_error_expiry_deletes_torrent() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Errored.Release");
    torrent.error = Some("provider exploded".to_string());
    torrent.completed = Some(Utc::now() - chrono::Duration::minutes(20));
    torrent.delete_on_error = 10;
    let torrent_id = torrent.id;
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    let deletions = harness.store.deletions().await;
    assert_eq!(deletions.len(), 1);
    assert_eq!(deletions[0].torrent_id, torrent_id);
    assert!(deletions[0].from_client);
    assert!(deletions[0].from_provider);
    assert!(deletions[0].delete_files);
}

#[tokio::test]
async fn test_error_expiry_waits_out_the_window() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Errored.Release");
    torrent.error = Some("provider exploded".to_string());
    torrent.completed = Some(Utc::now() - chrono::Duration::minutes(5));
    torrent.delete_on_error = 10;
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    assert!(harness.store.deletions().await.is_empty());
}

#[tokio::test]
async fn test_provider_error_status_is_terminal() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Bad.Release");
    torrent.status = TorrentStatus::Error;
    torrent.status_raw = "virus_detected".to_string();
    let torrent_id = torrent.id;
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    let torrent = harness.store.torrent(torrent_id).await.unwrap();
    assert!(torrent.completed.is_some());
    assert_eq!(
        torrent.error.as_deref(),
        Some("Received provider error: virus_detected")
    );
}

#[tokio::test]
async fn test_file_selection_invoked_once() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Selecting.Release");
    torrent.status = TorrentStatus::WaitingForFileSelection;
    torrent.files_selected = None;
    let torrent_id = torrent.id;
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    assert_eq!(harness.store.files_selected_calls().await, vec![torrent_id]);
    let torrent = harness.store.torrent(torrent_id).await.unwrap();
    assert!(torrent.files_selected.is_some());

    // Stamped; the next tick does not select again.
    orchestrator.tick().await.unwrap();
    assert_eq!(harness.store.files_selected_calls().await.len(), 1);
}

#[tokio::test]
async fn test_create_downloads_then_full_flow() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.symlink_config(5, 1));

    let mut torrent = fixtures::torrent("Season.Pack");
    torrent.files = vec![
        drover_core::TorrentFile {
            path: "Season.Pack/e01.mkv".to_string(),
            bytes: 100,
        },
        drover_core::TorrentFile {
            path: "Season.Pack/e02.mkv".to_string(),
            bytes: 100,
        },
    ];
    let torrent_id = torrent.id;
    harness.store.insert_torrent(torrent).await;
    harness
        .store
        .set_created_links(
            torrent_id,
            vec![
                "https://host.example/dl/e01.mkv".to_string(),
                "https://host.example/dl/e02.mkv".to_string(),
            ],
        )
        .await;

    harness.add_mount_file("Season.Pack", "e01.mkv");
    harness.add_mount_file("Season.Pack", "e02.mkv");

    assert!(
        harness
            .tick_until_complete(&orchestrator, torrent_id, 8)
            .await
    );

    let torrent = harness.store.torrent(torrent_id).await.unwrap();
    assert_eq!(torrent.downloads.len(), 2);
    assert!(torrent.downloads.iter().all(|d| d.completed.is_some()));
    assert!(torrent.downloads.iter().all(|d| d.error.is_none()));
    assert!(torrent.error.is_none());
}

#[tokio::test]
async fn test_download_none_completes_without_downloads() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Tracked.Only");
    torrent.host_download_action = HostDownloadAction::DownloadNone;
    let torrent_id = torrent.id;
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    let torrent = harness.store.torrent(torrent_id).await.unwrap();
    assert!(torrent.completed.is_some());
    assert!(torrent.error.is_none());
    assert!(torrent.downloads.is_empty());
}

#[tokio::test]
async fn test_finished_action_remove_client_only() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Done.Release");
    torrent.finished_action = FinishedAction::RemoveClient;
    let torrent_id = torrent.id;
    let download = fixtures::completed_download(torrent_id, "https://host.example/dl/file.mkv");
    torrent.downloads = vec![download];
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    // Local client record removed, provider-side record untouched.
    let deletions = harness.store.deletions().await;
    assert_eq!(deletions.len(), 1);
    assert!(deletions[0].from_client);
    assert!(!deletions[0].from_provider);
    assert!(!deletions[0].delete_files);

    assert_eq!(harness.store.hooks_run().await, vec![torrent_id]);
}

#[tokio::test]
async fn test_post_complete_hook_failure_is_swallowed() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Hooked.Release");
    let torrent_id = torrent.id;
    let download = fixtures::completed_download(torrent_id, "https://host.example/dl/file.mkv");
    torrent.downloads = vec![download];
    harness.store.insert_torrent(torrent).await;
    harness
        .store
        .fail_post_complete_hook(torrent_id, "hook blew up")
        .await;

    orchestrator.tick().await.unwrap();

    // Already complete; the hook failure does not undo it.
    let torrent = harness.store.torrent(torrent_id).await.unwrap();
    assert!(torrent.completed.is_some());
    assert!(torrent.error.is_none());
}

#[tokio::test]
async fn test_torrent_retry_flag_processing() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Retry.Release");
    torrent.retry = Some(Utc::now());
    torrent.retry_count = 0;
    torrent.torrent_retry_attempts = 2;
    let torrent_id = torrent.id;
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    assert_eq!(harness.store.retries().await, vec![(torrent_id, 0)]);
    let torrent = harness.store.torrent(torrent_id).await.unwrap();
    assert!(torrent.retry.is_none());
    assert_eq!(torrent.retry_count, 1);
}

#[tokio::test]
async fn test_torrent_retry_cap_clears_flag_without_retrying() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Exhausted.Release");
    torrent.retry = Some(Utc::now());
    torrent.retry_count = 3;
    torrent.torrent_retry_attempts = 2;
    let torrent_id = torrent.id;
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    assert!(harness.store.retries().await.is_empty());
    let torrent = harness.store.torrent(torrent_id).await.unwrap();
    assert!(torrent.retry.is_none());
    assert_eq!(torrent.retry_count, 3);
}

#[tokio::test]
async fn test_torrent_retry_failure_records_error() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Unretryable.Release");
    torrent.retry = Some(Utc::now());
    torrent.torrent_retry_attempts = 2;
    let torrent_id = torrent.id;
    harness.store.insert_torrent(torrent).await;
    harness.store.fail_retry(torrent_id, "provider refused").await;

    orchestrator.tick().await.unwrap();

    let torrent = harness.store.torrent(torrent_id).await.unwrap();
    assert!(torrent.retry.is_none());
    assert!(torrent.error.unwrap().contains("provider refused"));
}

#[tokio::test]
async fn test_orphaned_worker_is_discarded() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.symlink_config(2, 1));

    let mut torrent = fixtures::torrent("Vanishing.Release");
    let torrent_id = torrent.id;
    let download = fixtures::queued_download(torrent_id, "https://host.example/dl/file.mkv");
    torrent.downloads = vec![download];
    harness.store.insert_torrent(torrent).await;
    harness.add_mount_file("Vanishing.Release", "file.mkv");

    orchestrator.tick().await.unwrap();
    assert_eq!(orchestrator.active_downloads().len().await, 1);

    // The record disappears out from under the worker.
    harness
        .store
        .delete_torrent(torrent_id, true, false, false)
        .await
        .unwrap();

    orchestrator.tick().await.unwrap();
    assert_eq!(orchestrator.active_downloads().len().await, 0);
}

#[tokio::test]
async fn test_symlink_backend_refuses_archive_unpack() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.symlink_config(2, 1));

    let mut torrent = fixtures::torrent("Packed.Release");
    let torrent_id = torrent.id;
    let download =
        fixtures::unpack_queued_download(torrent_id, "https://host.example/dl/archive.rar");
    let download_id = download.id;
    torrent.downloads = vec![download];
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    let download = harness.store.download(download_id).await.unwrap();
    assert_eq!(
        download.error.as_deref(),
        Some("Will not unpack with the symlink backend")
    );
    assert!(download.completed.is_some());
    assert_eq!(orchestrator.active_unpacks().len().await, 0);
}

#[tokio::test]
async fn test_non_archive_skips_unpack_registry() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Plain.Release");
    let torrent_id = torrent.id;
    let download =
        fixtures::unpack_queued_download(torrent_id, "https://host.example/dl/movie.mkv");
    let download_id = download.id;
    torrent.downloads = vec![download];
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    let download = harness.store.download(download_id).await.unwrap();
    assert!(download.unpacking_started.is_some());
    assert!(download.unpacking_finished.is_some());
    assert!(download.completed.is_some());
    assert!(download.error.is_none());
    assert_eq!(orchestrator.active_unpacks().len().await, 0);
}

#[tokio::test]
async fn test_missing_link_at_unpack_is_terminal() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Linkless.Release");
    let torrent_id = torrent.id;
    let mut download =
        fixtures::unpack_queued_download(torrent_id, "https://host.example/dl/file.rar");
    download.link = None;
    let download_id = download.id;
    torrent.downloads = vec![download];
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    let download = harness.store.download(download_id).await.unwrap();
    assert_eq!(download.error.as_deref(), Some("Download link cannot be empty"));
    assert!(download.completed.is_some());
}

#[tokio::test]
async fn test_unpack_limit_admits_one_per_tick() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Archives.Release");
    let torrent_id = torrent.id;

    let mut first =
        fixtures::unpack_queued_download(torrent_id, "https://host.example/dl/part1.rar");
    first.download_queued = Some(Utc::now() - chrono::Duration::seconds(10));
    let first_id = first.id;
    let second =
        fixtures::unpack_queued_download(torrent_id, "https://host.example/dl/part2.rar");
    let second_id = second.id;
    torrent.downloads = vec![first, second];
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    let first = harness.store.download(first_id).await.unwrap();
    let second = harness.store.download(second_id).await.unwrap();
    assert!(first.unpacking_started.is_some());
    assert!(second.unpacking_started.is_none());
    assert!(orchestrator.active_unpacks().len().await <= 1);
}

#[tokio::test]
async fn test_unpack_failure_is_terminal_for_download() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Corrupt.Release");
    let torrent_id = torrent.id;
    let download =
        fixtures::unpack_queued_download(torrent_id, "https://host.example/dl/broken.rar");
    let download_id = download.id;
    torrent.downloads = vec![download];
    harness.store.insert_torrent(torrent).await;
    // No archive on disk: whichever extraction tool runs, it fails.

    orchestrator.tick().await.unwrap();
    let download = harness.store.download(download_id).await.unwrap();
    assert!(download.unpacking_started.is_some());

    // Tick until the unpack worker is reaped.
    let mut done = false;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        orchestrator.tick().await.unwrap();
        let download = harness.store.download(download_id).await.unwrap();
        if download.completed.is_some() {
            done = true;
            break;
        }
    }
    assert!(done, "unpack worker never reaped");

    let download = harness.store.download(download_id).await.unwrap();
    assert!(download.error.is_some());
    assert_eq!(orchestrator.active_unpacks().len().await, 0);
}

#[tokio::test]
async fn test_initialize_resets_in_flight_stamps() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(harness.aria2_config(2, 1));

    let mut torrent = fixtures::torrent("Recovering.Release");
    let torrent_id = torrent.id;

    let mut mid_download =
        fixtures::queued_download(torrent_id, "https://host.example/dl/one.mkv");
    mid_download.download_started = Some(Utc::now());
    let mid_download_id = mid_download.id;

    let mut mid_unpack =
        fixtures::unpack_queued_download(torrent_id, "https://host.example/dl/two.rar");
    mid_unpack.unpacking_started = Some(Utc::now());
    let mid_unpack_id = mid_unpack.id;

    torrent.downloads = vec![mid_download, mid_unpack];
    harness.store.insert_torrent(torrent).await;

    orchestrator.initialize().await.unwrap();

    let download = harness.store.download(mid_download_id).await.unwrap();
    assert!(download.download_started.is_none());
    assert!(download.download_queued.is_some());

    let unpack = harness.store.download(mid_unpack_id).await.unwrap();
    assert!(unpack.unpacking_started.is_none());
    assert!(unpack.unpacking_queued.is_some());
}

#[tokio::test]
async fn test_snapshot_callback_receives_progress() {
    let harness = TestHarness::new();

    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let orchestrator = harness
        .orchestrator(harness.aria2_config(2, 1))
        .with_snapshot_callback(Arc::new(move |snapshot| {
            sink.lock().unwrap().push(snapshot);
        }));

    let mut torrent = fixtures::torrent("Observed.Release");
    let torrent_id = torrent.id;
    let mut download = fixtures::queued_download(torrent_id, "https://host.example/dl/file.mkv");
    download.bytes_total = 100;
    download.bytes_done = 50;
    download.download_started = Some(Utc::now());
    torrent.downloads = vec![download];
    harness.store.insert_torrent(torrent).await;

    orchestrator.tick().await.unwrap();

    let snapshots = received.lock().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].torrents.len(), 1);
    assert_eq!(snapshots[0].torrents[0].percent, 50);
    assert_eq!(snapshots[0].torrents[0].downloads_total, 1);
}
