//! Configuration structures for asset-agent.
//!
//! - [`WatchConfig`] - watched root, backend selection and loop timing
//! - [`BusConfig`] - event fan-out settings
//! - [`Config`] - root configuration combining all settings
//!
//! Every section is `#[serde(default)]`, so a configuration file only needs
//! the keys it wants to override.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound for the idle poll interval.
///
/// The interval bounds both event latency and `stop()` responsiveness.
const MAX_POLL_INTERVAL_MS: u64 = 1_000;

/// Which OS notification backend the watcher should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// inotify on Linux, the `notify` crate's recommended watcher elsewhere.
    #[default]
    Auto,
    /// Linux inotify, driven directly.
    Inotify,
    /// The portable `notify` crate backend, one non-recursive watch per directory.
    Notify,
}

impl BackendKind {
    /// Returns the lowercase name used in configuration files and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Inotify => "inotify",
            Self::Notify => "notify",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the recursive watcher.
///
/// # Examples
///
/// ```
/// use ag_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.poll_interval_ms, 10);
/// assert_eq!(config.rename_timeout_ms, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// The directory tree to watch.
    pub root: Utf8PathBuf,

    /// Backend used to receive raw notifications.
    pub backend: BackendKind,

    /// Sleep between polls when the backend has no data, in milliseconds.
    pub poll_interval_ms: u64,

    /// How long a move-out waits for its move-in before degrading to a
    /// removal, in milliseconds.
    pub rename_timeout_ms: u64,

    /// Whether directory walks follow symbolic links.
    pub follow_links: bool,
}

impl WatchConfig {
    /// Creates a watch configuration for `root` with default timings.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Returns the idle poll interval.
    #[inline]
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the rename pairing timeout.
    #[inline]
    #[must_use]
    pub const fn rename_timeout(&self) -> Duration {
        Duration::from_millis(self.rename_timeout_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("assets"),
            backend: BackendKind::Auto,
            poll_interval_ms: 10,
            rename_timeout_ms: 100,
            follow_links: false,
        }
    }
}

/// Configuration for the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Queue depth of each subscriber before events are dropped for it.
    pub subscriber_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 256,
        }
    }
}

/// Root configuration for asset-agent.
///
/// # Examples
///
/// ```
/// use ag_core::Config;
///
/// let config = Config::from_json_str(r#"{"watch": {"root": "/srv/assets"}}"#).unwrap();
/// assert_eq!(config.watch.root.as_str(), "/srv/assets");
/// assert_eq!(config.bus.subscriber_capacity, 256);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watcher configuration.
    pub watch: WatchConfig,

    /// Event bus configuration.
    pub bus: BusConfig,
}

impl Config {
    /// Parses a configuration from JSON text and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Checks option ranges.
    ///
    /// Does not touch the filesystem; root existence is checked when the
    /// watcher starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.root.as_str().is_empty() {
            return Err(ConfigError::invalid_option("watch.root", "must not be empty"));
        }
        if self.watch.poll_interval_ms == 0 || self.watch.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::invalid_option(
                "watch.poll_interval_ms",
                format!("must be between 1 and {MAX_POLL_INTERVAL_MS}"),
            ));
        }
        if self.bus.subscriber_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "bus.subscriber_capacity",
                "must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_config_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.backend, BackendKind::Auto);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.rename_timeout(), Duration::from_millis(100));
        assert!(!config.follow_links);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let json = r#"{"watch": {"root": "/srv/assets", "backend": "notify"}}"#;
        let config = Config::from_json_str(json).unwrap();
        assert_eq!(config.watch.root.as_str(), "/srv/assets");
        assert_eq!(config.watch.backend, BackendKind::Notify);
        assert_eq!(config.watch.poll_interval_ms, 10);
        assert_eq!(config.bus.subscriber_capacity, 256);
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let json = r#"{"watch": {"poll_interval_ms": 0}}"#;
        let err = Config::from_json_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { ref option, .. } if option == "watch.poll_interval_ms"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let json = r#"{"bus": {"subscriber_capacity": 0}}"#;
        assert!(Config::from_json_str(json).is_err());
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        let json = r#"{"watch": {"backend": "kqueue"}}"#;
        assert!(matches!(
            Config::from_json_str(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        std::fs::write(&path, r#"{"watch": {"rename_timeout_ms": 250}}"#).unwrap();

        let path = Utf8PathBuf::from_path_buf(path).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.watch.rename_timeout_ms, 250);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Utf8Path::new("/nonexistent/agent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_backend_kind_serialization() {
        assert_eq!(serde_json::to_string(&BackendKind::Auto).unwrap(), r#""auto""#);
        assert_eq!(
            serde_json::to_string(&BackendKind::Inotify).unwrap(),
            r#""inotify""#
        );
        assert_eq!(BackendKind::Notify.to_string(), "notify");
    }
}
