//! Torrent/download data model and the repository seam.

mod memory;
mod store;
mod types;

pub use memory::{MemoryTorrentStore, RecordedDeletion};
pub use store::{StoreError, TorrentStore};
pub use types::{
    Download, FinishedAction, HostDownloadAction, Torrent, TorrentFile, TorrentStatus,
};
