//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Enable/disable the tick driver.
    /// When disabled, ticks must be invoked manually.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Interval between ticks (milliseconds). Ticks never overlap: the
    /// driver waits for a tick to finish before sleeping the interval.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Courtesy delay between download launches within one torrent
    /// (milliseconds), so the provider API is not hammered.
    #[serde(default = "default_start_delay")]
    pub start_delay_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    1000 // 1 second
}

fn default_start_delay() -> u64 {
    100
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            tick_interval_ms: default_tick_interval(),
            start_delay_ms: default_start_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!(config.enabled);
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.start_delay_ms, 100);
    }

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            enabled = false
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.tick_interval_ms, 1000);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            enabled = true
            tick_interval_ms = 5000
            start_delay_ms = 250
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.tick_interval_ms, 5000);
        assert_eq!(config.start_delay_ms, 250);
    }
}
