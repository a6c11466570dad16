//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default acknowledgment timeout for relayed messages
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5000;

/// Default maximum payload size (1MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Peer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Directory holding channel lock files and sockets
    #[serde(rename = "runtime-dir")]
    pub runtime_dir: PathBuf,

    /// How long a client waits for the primary to acknowledge a message
    #[serde(rename = "send-timeout-ms")]
    pub send_timeout_ms: u64,

    /// Connection attempts before a send gives up
    #[serde(rename = "connect-attempts")]
    pub connect_attempts: u32,

    /// Pause between connection attempts
    #[serde(rename = "connect-retry-delay-ms")]
    pub connect_retry_delay_ms: u64,

    /// Largest message payload accepted on either side, in bytes
    #[serde(rename = "max-message-size")]
    pub max_message_size: usize,

    /// Buffered notifications per subscriber before the oldest are dropped
    #[serde(rename = "event-capacity")]
    pub event_capacity: usize,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Default runtime directory
///
/// Prefers the per-user runtime dir so channels never leak across users.
pub fn default_runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("singlepeer")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime_dir: default_runtime_dir(),
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            connect_attempts: 2,
            connect_retry_delay_ms: 250,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            event_capacity: 1024,
            log_level: None,
        }
    }
}

impl Config {
    /// Config rooted at a specific runtime directory (for tests and embedding)
    pub fn with_runtime_dir(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            ..Default::default()
        }
    }

    /// Default send timeout as a Duration
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Pause between connection attempts as a Duration
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .singlepeer.yml
        let local_config = PathBuf::from(".singlepeer.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/singlepeer/singlepeer.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("singlepeer").join("singlepeer.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up
    ///
    /// Errors are swallowed: a broken config file is reported later by `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        debug!(path = %path.as_ref().display(), "Config::load_from_file: called");
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.send_timeout_ms, 5000);
        assert_eq!(config.connect_attempts, 2);
        assert_eq!(config.connect_retry_delay_ms, 250);
        assert_eq!(config.max_message_size, 1024 * 1024);
        assert_eq!(config.event_capacity, 1024);
        assert!(config.runtime_dir.ends_with("singlepeer"));
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_send_timeout_duration() {
        let config = Config {
            send_timeout_ms: 750,
            ..Default::default()
        };
        assert_eq!(config.send_timeout(), Duration::from_millis(750));
    }

    #[test]
    fn test_load_partial_yaml_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("singlepeer.yml");
        fs::write(&path, "send-timeout-ms: 100\nruntime-dir: /tmp/sp-test\nlog-level: debug\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.send_timeout_ms, 100);
        assert_eq!(config.runtime_dir, PathBuf::from("/tmp/sp-test"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.connect_attempts, 2);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yml");
        fs::write(&path, "send-timeout-ms: [not, a, number]\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
        assert!(Config::load_log_level(Some(&path)).is_none());
    }
}
