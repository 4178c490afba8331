//! Configuration loading for the desktop link runtime.
//!
//! Configuration is loaded from a TOML file (default: `phonelink.toml`).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the device link.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Name this desktop announces to the phone (default: "desktop").
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Seconds an outgoing call may ring before it is abandoned (default: 30).
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
    /// Seconds to wait for the transport to accept an outbound frame (default: 15).
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Maximum number of mirrored notifications kept in memory (default: 100).
    #[serde(default = "default_notification_retention")]
    pub notification_retention: usize,
    /// Chunk size in bytes for file transfer frames (default: 64KB).
    #[serde(default = "default_transfer_chunk_bytes")]
    pub transfer_chunk_bytes: usize,
    /// Directory where received files are written (default: "downloads").
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Path to the SQLite database file (default: "phonelink.db").
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Maximum number of missed calls kept in the call snapshot (default: 25).
    #[serde(default = "default_missed_call_retention")]
    pub missed_call_retention: usize,
}

// Default value functions
fn default_device_name() -> String {
    "desktop".to_string()
}

fn default_dial_timeout_secs() -> u64 {
    30
}

fn default_send_timeout_secs() -> u64 {
    15
}

fn default_notification_retention() -> usize {
    100
}

fn default_transfer_chunk_bytes() -> usize {
    64 * 1024 // 64KB
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("phonelink.db")
}

fn default_missed_call_retention() -> usize {
    25
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            dial_timeout_secs: default_dial_timeout_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            notification_retention: default_notification_retention(),
            transfer_chunk_bytes: default_transfer_chunk_bytes(),
            download_dir: default_download_dir(),
            database_path: default_database_path(),
            missed_call_retention: default_missed_call_retention(),
        }
    }
}

impl LinkConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// How long an outgoing call may ring before it is abandoned.
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    /// How long an outbound frame may wait on the transport.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LinkConfig::default();
        assert_eq!(config.device_name, "desktop");
        assert_eq!(config.dial_timeout_secs, 30);
        assert_eq!(config.send_timeout_secs, 15);
        assert_eq!(config.notification_retention, 100);
        assert_eq!(config.transfer_chunk_bytes, 64 * 1024);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
device_name = "office pc"
dial_timeout_secs = 20
notification_retention = 50
download_dir = "/home/me/incoming"
database_path = "/data/phonelink.db"
"#;

        let config: LinkConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.device_name, "office pc");
        assert_eq!(config.dial_timeout_secs, 20);
        assert_eq!(config.notification_retention, 50);
        assert_eq!(config.download_dir, PathBuf::from("/home/me/incoming"));
        assert_eq!(config.database_path, PathBuf::from("/data/phonelink.db"));
        // Unset fields keep their defaults
        assert_eq!(config.send_timeout_secs, 15);
        assert_eq!(config.missed_call_retention, 25);
    }

    #[test]
    fn empty_config_uses_all_defaults() {
        let config: LinkConfig = toml::from_str("").unwrap();
        assert_eq!(config.device_name, "desktop");
        assert_eq!(config.database_path, PathBuf::from("phonelink.db"));
        assert_eq!(config.transfer_chunk_bytes, 64 * 1024);
    }

    #[test]
    fn timeouts_convert_to_durations() {
        let config = LinkConfig::default();
        assert_eq!(config.dial_timeout(), Duration::from_secs(30));
        assert_eq!(config.send_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn load_reads_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phonelink.toml");
        std::fs::write(&path, "device_name = \"den\"\nsend_timeout_secs = 5\n").unwrap();

        let config = LinkConfig::load(&path).unwrap();
        assert_eq!(config.device_name, "den");
        assert_eq!(config.send_timeout_secs, 5);
        assert_eq!(config.dial_timeout_secs, 30);
    }

    #[test]
    fn load_reports_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();

        let result = LinkConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }
}
