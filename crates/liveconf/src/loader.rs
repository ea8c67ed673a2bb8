//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, LiveConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/livemirror/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("livemirror/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("livemirror.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw TOML table.
pub fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Merge `overlay` into `base`. Nested tables merge key by key, anything else is replaced.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Turn a merged table into a config; missing keys take their defaults.
pub fn table_to_config(table: toml::Table, origin: &Path) -> Result<LiveConfig, ConfigError> {
    let mut config: LiveConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;
    config.paths.expand();
    Ok(config)
}

/// Load config from a single TOML file.
pub fn load_from_file(path: &Path) -> Result<LiveConfig, ConfigError> {
    table_to_config(read_table(path)?, path)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut LiveConfig, sources: &mut ConfigSources) {
    apply_overrides_with(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides_with<F>(config: &mut LiveConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("LIVEMIRROR_HOST") {
        config.osc.host = v;
        sources.env_overrides.push("LIVEMIRROR_HOST".to_string());
    }
    if let Some(port) = lookup("LIVEMIRROR_SEND_PORT").and_then(|v| v.parse().ok()) {
        config.osc.send_port = port;
        sources.env_overrides.push("LIVEMIRROR_SEND_PORT".to_string());
    }
    if let Some(port) = lookup("LIVEMIRROR_LISTEN_PORT").and_then(|v| v.parse().ok()) {
        config.osc.listen_port = port;
        sources.env_overrides.push("LIVEMIRROR_LISTEN_PORT".to_string());
    }
    if let Some(ms) = lookup("LIVEMIRROR_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.osc.timeout_ms = ms;
        sources.env_overrides.push("LIVEMIRROR_TIMEOUT_MS".to_string());
    }

    if let Some(v) = lookup("LIVEMIRROR_CACHE_DIR") {
        config.paths.cache_dir = expand_path(&v);
        sources.env_overrides.push("LIVEMIRROR_CACHE_DIR".to_string());
    }
    // Historical name, still honoured by the project finder
    if let Some(v) = lookup("LIVE_ROOT") {
        config.paths.live_root = Some(expand_path(&v));
        sources.env_overrides.push("LIVE_ROOT".to_string());
    }

    if let Some(v) = lookup("LIVEMIRROR_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("LIVEMIRROR_LOG_LEVEL".to_string());
    }
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
