//! Configuration sections.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::loader::expand_path;

/// Where LiveOSC lives and how long we wait for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OscConfig {
    /// Host running Live with the LiveOSC surface.
    /// Default: 127.0.0.1
    #[serde(default = "OscConfig::default_host")]
    pub host: String,

    /// Port LiveOSC listens on.
    /// Default: 9000
    #[serde(default = "OscConfig::default_send_port")]
    pub send_port: u16,

    /// Port LiveOSC replies to. We bind it locally.
    /// Default: 9001
    #[serde(default = "OscConfig::default_listen_port")]
    pub listen_port: u16,

    /// Request timeout in milliseconds.
    /// Default: 3000
    #[serde(default = "OscConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    /// Polling granularity for blocking waits, in milliseconds.
    /// Default: 10
    #[serde(default = "OscConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl OscConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_send_port() -> u16 {
        9000
    }

    fn default_listen_port() -> u16 {
        9001
    }

    fn default_timeout_ms() -> u64 {
        3000
    }

    fn default_poll_interval_ms() -> u64 {
        10
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            send_port: Self::default_send_port(),
            listen_port: Self::default_listen_port(),
            timeout_ms: Self::default_timeout_ms(),
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

/// Knobs for the session scanner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Largest block of track names requested at once.
    /// Default: 256
    #[serde(default = "ScanConfig::default_max_tracks_per_query")]
    pub max_tracks_per_query: usize,

    /// Fetch clip names during a scan.
    #[serde(default)]
    pub clip_names: bool,

    /// Fetch devices and parameters during a scan.
    #[serde(default)]
    pub devices: bool,

    /// Memoize property reads until the next uncached read.
    #[serde(default)]
    pub caching: bool,
}

impl ScanConfig {
    fn default_max_tracks_per_query() -> usize {
        256
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_tracks_per_query: Self::default_max_tracks_per_query(),
            clip_names: false,
            devices: false,
            caching: false,
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Directory holding session snapshots.
    /// Default: ~/.cache/livemirror
    #[serde(default = "PathsConfig::default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Extra directory searched for Live projects (also `LIVE_ROOT`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_root: Option<PathBuf>,
}

impl PathsConfig {
    fn default_cache_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.cache_dir().join("livemirror"))
            .unwrap_or_else(|| PathBuf::from(".livemirror"))
    }

    /// Expand `~` and `$VAR` prefixes left over from a config file.
    pub(crate) fn expand(&mut self) {
        self.cache_dir = expand_path(&self.cache_dir.to_string_lossy());
        if let Some(root) = self.live_root.take() {
            self.live_root = Some(expand_path(&root.to_string_lossy()));
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: Self::default_cache_dir(),
            live_root: None,
        }
    }
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Log filter (trace, debug, info, warn, error, or a full EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
