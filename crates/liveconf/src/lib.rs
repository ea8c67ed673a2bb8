//! Configuration loading for the livemirror crates.
//!
//! Everything that talks to Live reads its endpoints, timeouts and paths from
//! here, so the defaults match a stock LiveOSC install and nothing needs a
//! config file to get going.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, tables merge key by key):
//! 1. `/etc/livemirror/config.toml` (system)
//! 2. `~/.config/livemirror/config.toml` (user)
//! 3. `./livemirror.toml` (local override, or an explicit path)
//! 4. Environment variables (`LIVEMIRROR_*`, `LIVE_ROOT`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [osc]
//! host = "127.0.0.1"
//! send_port = 9000
//! listen_port = 9001
//! timeout_ms = 3000
//!
//! [scan]
//! max_tracks_per_query = 256
//! clip_names = true
//! devices = false
//!
//! [paths]
//! cache_dir = "~/.cache/livemirror"
//! live_root = "~/Music/Live Sets"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod settings;

pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use settings::{OscConfig, PathsConfig, ScanConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LiveConfig {
    #[serde(default)]
    pub osc: OscConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl LiveConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` standing in for `./livemirror.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::read_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::table_to_config(merged, &origin)?;

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.osc.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.osc.poll_interval_ms.max(1))
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
