pub mod config;
pub mod downloader;
pub mod metrics;
pub mod orchestrator;
pub mod testing;
pub mod torrent;
pub mod unpack;

pub use config::{
    load_config, load_config_from_str, validate_config, Aria2Config, Config, ConfigError,
    DownloaderBackend, SanitizedConfig, SymlinkConfig,
};
pub use downloader::{
    Aria2Client, Aria2Downloader, DownloadProgress, DownloadWorker, Downloader, DownloaderError,
    SymlinkDownloader,
};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorSnapshot, OrchestratorStatus,
    SnapshotCallback, WorkerRegistry,
};
pub use torrent::{
    Download, FinishedAction, HostDownloadAction, MemoryTorrentStore, StoreError, Torrent,
    TorrentFile, TorrentStatus, TorrentStore,
};
pub use unpack::{is_archive_file, UnpackError, UnpackWorker};
