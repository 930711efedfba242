//! Configuration for the capture router.
//!
//! Loads from a TOML file under the user config directory, falling back to
//! defaults on any problem.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub sockets: SocketConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            timing: TimingConfig::default(),
            sockets: SocketConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether capture runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
        }
    }
}

/// Timing knobs of the capture state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay before the initial scan, letting client-side rendering finish.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Hard minimum interval between scans, regardless of mutation rate.
    #[serde(default = "default_throttle_interval")]
    pub throttle_interval_ms: u64,

    /// Quiet period after the last relevant mutation before a scan runs.
    #[serde(default = "default_debounce_delay")]
    pub debounce_delay_ms: u64,

    /// Spacing between records in a multi-record incremental send.
    #[serde(default = "default_send_spacing")]
    pub send_spacing_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1000,
            throttle_interval_ms: 3000,
            debounce_delay_ms: 2000,
            send_spacing_ms: 100,
        }
    }
}

impl TimingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }

    pub fn send_spacing(&self) -> Duration {
        Duration::from_millis(self.send_spacing_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Socket the page bridge connects to, one connection per page context.
    #[serde(default = "default_bridge_socket")]
    pub bridge_socket_path: PathBuf,

    /// Socket of the archive service.
    #[serde(default = "default_archive_socket")]
    pub archive_socket_path: PathBuf,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bridge_socket_path: default_bridge_socket(),
            archive_socket_path: default_archive_socket(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_settle_delay() -> u64 {
    1000
}

fn default_throttle_interval() -> u64 {
    3000
}

fn default_debounce_delay() -> u64 {
    2000
}

fn default_send_spacing() -> u64 {
    100
}

fn default_bridge_socket() -> PathBuf {
    PathBuf::from("/tmp/capture-router.sock")
}

fn default_archive_socket() -> PathBuf {
    PathBuf::from("/tmp/conversation-archive.sock")
}

impl CaptureConfig {
    /// Load configuration from the default path.
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capture-router")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();
        assert!(config.general.enabled);
        assert_eq!(config.timing.throttle_interval_ms, 3000);
        assert_eq!(config.timing.debounce_delay_ms, 2000);
        assert_eq!(config.timing.settle_delay_ms, 1000);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[timing]
throttle_interval_ms = 5000
"#;

        let config: CaptureConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.timing.throttle_interval_ms, 5000);
        // Unspecified fields keep their defaults.
        assert_eq!(config.timing.debounce_delay_ms, 2000);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig::load_from_path(dir.path().join("nope.toml"));
        assert!(config.general.enabled);
    }
}
