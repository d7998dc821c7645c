//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - The tick loop (count, duration)
//! - Download and unpack worker lifecycle
//! - Retry and completion counters

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter};

// =============================================================================
// Tick loop
// =============================================================================

/// Ticks executed total.
pub static TICKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("drover_ticks_total", "Total reconciliation ticks executed").unwrap()
});

/// Tick duration in seconds.
pub static TICK_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("drover_tick_duration_seconds", "Duration of one tick").buckets(vec![
            0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
    )
    .unwrap()
});

// =============================================================================
// Downloads
// =============================================================================

/// Downloads started total.
pub static DOWNLOADS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("drover_downloads_started_total", "Total downloads started").unwrap()
});

/// Downloads completed total.
pub static DOWNLOADS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "drover_downloads_completed_total",
        "Total downloads completed successfully",
    )
    .unwrap()
});

/// Downloads terminally failed total.
pub static DOWNLOADS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "drover_downloads_failed_total",
        "Total downloads that failed past the retry cap",
    )
    .unwrap()
});

/// Download retry attempts total.
pub static DOWNLOAD_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "drover_download_retries_total",
        "Total download retry attempts",
    )
    .unwrap()
});

// =============================================================================
// Unpacks
// =============================================================================

/// Unpacks started total.
pub static UNPACKS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("drover_unpacks_started_total", "Total unpack jobs started").unwrap()
});

/// Unpacks completed total.
pub static UNPACKS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "drover_unpacks_completed_total",
        "Total unpack jobs completed successfully",
    )
    .unwrap()
});

/// Unpacks failed total.
pub static UNPACKS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("drover_unpacks_failed_total", "Total unpack jobs that failed").unwrap()
});

// =============================================================================
// Torrents
// =============================================================================

/// Whole-torrent retry attempts total.
pub static TORRENT_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "drover_torrent_retries_total",
        "Total whole-torrent retry attempts",
    )
    .unwrap()
});

/// Torrents completed total.
pub static TORRENTS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "drover_torrents_completed_total",
        "Total torrents that reached the completed state",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Tick loop
        Box::new(TICKS_TOTAL.clone()),
        Box::new(TICK_DURATION.clone()),
        // Downloads
        Box::new(DOWNLOADS_STARTED.clone()),
        Box::new(DOWNLOADS_COMPLETED.clone()),
        Box::new(DOWNLOADS_FAILED.clone()),
        Box::new(DOWNLOAD_RETRIES.clone()),
        // Unpacks
        Box::new(UNPACKS_STARTED.clone()),
        Box::new(UNPACKS_COMPLETED.clone()),
        Box::new(UNPACKS_FAILED.clone()),
        // Torrents
        Box::new(TORRENT_RETRIES.clone()),
        Box::new(TORRENTS_COMPLETED.clone()),
    ]
}
