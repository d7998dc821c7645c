use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Debrid provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// API key for the debrid provider. An empty key disables processing.
    pub api_key: String,
}

/// General download handling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Base path downloads are written under.
    #[serde(default = "default_download_path")]
    pub download_path: PathBuf,
    /// Maximum concurrent downloads (clamped to at least 1).
    #[serde(default = "default_download_limit")]
    pub download_limit: usize,
    /// Maximum concurrent unpack jobs (clamped to at least 1).
    #[serde(default = "default_unpack_limit")]
    pub unpack_limit: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            download_limit: default_download_limit(),
            unpack_limit: default_unpack_limit(),
        }
    }
}

fn default_download_path() -> PathBuf {
    PathBuf::from("/downloads")
}

fn default_download_limit() -> usize {
    2
}

fn default_unpack_limit() -> usize {
    1
}

/// Downloader backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloaderConfig {
    /// Which backend handles transfers to the host.
    pub backend: DownloaderBackend,
    /// aria2-specific configuration (required when backend = "aria2")
    #[serde(default)]
    pub aria2: Option<Aria2Config>,
    /// Symlink-specific configuration (required when backend = "symlink")
    #[serde(default)]
    pub symlink: Option<SymlinkConfig>,
}

/// Available downloader backends
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloaderBackend {
    Aria2,
    Symlink,
}

/// aria2 download agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Aria2Config {
    /// aria2 JSON-RPC endpoint (e.g., "http://localhost:6800/jsonrpc")
    pub url: String,
    /// RPC secret token, if the agent requires one.
    #[serde(default)]
    pub secret: Option<String>,
    /// Request timeout in seconds (default: 10)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    10
}

/// Symlink backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SymlinkConfig {
    /// Root of the mounted remote filesystem that materializes provider files.
    pub mount_path: PathBuf,
    /// How many times to poll the mount for a file before giving up.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Delay between polling attempts in milliseconds.
    #[serde(default = "default_poll_delay")]
    pub poll_delay_ms: u64,
    /// When multiple directories hold a matching file, pick the most recently
    /// created one. Disable to take the first match in listing order.
    #[serde(default = "default_prefer_newest")]
    pub prefer_newest: bool,
    /// Optional secondary root that receives a mirror of every symlink,
    /// laid out per the torrent's relative file paths.
    #[serde(default)]
    pub mirror_path: Option<PathBuf>,
    /// Staging directory holding `<torrent>.torrent` side-car files that are
    /// relocated into the mirror root alongside the mirrored links.
    #[serde(default)]
    pub staging_path: Option<PathBuf>,
    /// Command executed before each polling attempt to nudge the mount into
    /// refreshing its directory listing. Best-effort; failures are logged.
    #[serde(default)]
    pub refresh_command: Option<String>,
}

fn default_attempts() -> u32 {
    10
}

fn default_poll_delay() -> u64 {
    1000
}

fn default_prefer_newest() -> bool {
    true
}

/// Sanitized config for logging and API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub provider: SanitizedProviderConfig,
    pub general: GeneralConfig,
    pub downloader: SanitizedDownloaderConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub api_key_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDownloaderConfig {
    pub backend: DownloaderBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria2: Option<SanitizedAria2Config>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symlink: Option<SymlinkConfig>,
}

/// Sanitized aria2 config (RPC secret hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAria2Config {
    pub url: String,
    pub secret_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            provider: SanitizedProviderConfig {
                api_key_configured: !config.provider.api_key.is_empty(),
            },
            general: config.general.clone(),
            downloader: SanitizedDownloaderConfig {
                backend: config.downloader.backend,
                aria2: config.downloader.aria2.as_ref().map(|a| SanitizedAria2Config {
                    url: a.url.clone(),
                    secret_configured: a.secret.as_deref().is_some_and(|s| !s.is_empty()),
                    timeout_secs: a.timeout_secs,
                }),
                symlink: config.downloader.symlink.clone(),
            },
            orchestrator: config.orchestrator.clone(),
        }
    }
}
