//! Orchestrator: the periodic reconciliation loop.
//!
//! Each tick reaps finished workers, applies retry/expiry policy and starts
//! newly eligible work up to the registry ceilings:
//! - **Ticks**: serial, driven by a single timer
//! - **Per-torrent bodies**: sequential within a tick
//! - **Download launches**: concurrent within a torrent, bounded by registry

mod config;
mod registry;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use registry::WorkerRegistry;
pub use runner::Orchestrator;
pub use types::{
    OrchestratorError, OrchestratorSnapshot, OrchestratorStatus, SnapshotCallback, TorrentProgress,
};
