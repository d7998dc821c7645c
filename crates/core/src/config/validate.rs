use super::{types::Config, ConfigError};
use crate::config::DownloaderBackend;

/// Validate configuration
/// Currently validates:
/// - Provider section exists (enforced by serde)
/// - The selected downloader backend has its sub-config present
/// - Concurrency limits are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    match config.downloader.backend {
        DownloaderBackend::Aria2 => {
            let aria2 = config.downloader.aria2.as_ref().ok_or_else(|| {
                ConfigError::ValidationError(
                    "downloader.backend = \"aria2\" requires a [downloader.aria2] section"
                        .to_string(),
                )
            })?;
            if aria2.url.is_empty() {
                return Err(ConfigError::ValidationError(
                    "downloader.aria2.url cannot be empty".to_string(),
                ));
            }
        }
        DownloaderBackend::Symlink => {
            let symlink = config.downloader.symlink.as_ref().ok_or_else(|| {
                ConfigError::ValidationError(
                    "downloader.backend = \"symlink\" requires a [downloader.symlink] section"
                        .to_string(),
                )
            })?;
            if symlink.mount_path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(
                    "downloader.symlink.mount_path cannot be empty".to_string(),
                ));
            }
            if symlink.attempts == 0 {
                return Err(ConfigError::ValidationError(
                    "downloader.symlink.attempts must be at least 1".to_string(),
                ));
            }
        }
    }

    if config.general.download_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "general.download_path cannot be empty".to_string(),
        ));
    }

    if config.general.download_limit == 0 {
        return Err(ConfigError::ValidationError(
            "general.download_limit must be at least 1".to_string(),
        ));
    }

    if config.general.unpack_limit == 0 {
        return Err(ConfigError::ValidationError(
            "general.unpack_limit must be at least 1".to_string(),
        ));
    }

    Ok(())
}
