//! teamplay-sync configuration
//!
//! Resolution order, highest priority first:
//! 1. Command-line argument / environment variable (handled by clap)
//! 2. TOML config file
//! 3. Compiled defaults
//!
//! A missing config file is not an error; a malformed one is.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Sync server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP / WebSocket listen address
    pub bind_addr: SocketAddr,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Period of the store reconciliation task; 0 disables it
    pub refresh_interval_secs: u64,
    /// SSE keep-alive interval
    pub sse_keep_alive_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5750)),
            database_path: default_database_path(),
            refresh_interval_secs: 60,
            sse_keep_alive_secs: 15,
        }
    }
}

/// On-disk TOML representation; every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TomlConfig {
    pub bind: Option<String>,
    pub database: Option<PathBuf>,
    pub refresh_interval_secs: Option<u64>,
    pub sse_keep_alive_secs: Option<u64>,
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub bind: Option<String>,
    pub database: Option<PathBuf>,
    pub refresh_interval_secs: Option<u64>,
}

impl Config {
    /// Load configuration
    ///
    /// `config_file` falls back to the platform config directory
    /// (`~/.config/teamplay/config.toml` on Linux) when not given.
    pub fn load(config_file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let path = config_file.map(Path::to_path_buf).or_else(default_config_file);

        let file_config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                info!("Loaded config file: {}", path.display());
                parse_toml(&content)?
            }
            Some(path) => {
                warn!("Config file not found: {}, using defaults", path.display());
                TomlConfig::default()
            }
            None => TomlConfig::default(),
        };

        Self::resolve(file_config, overrides)
    }

    /// Merge file values and overrides over the compiled defaults
    pub fn resolve(file: TomlConfig, overrides: ConfigOverrides) -> Result<Self> {
        let defaults = Self::default();

        let bind_addr = match overrides.bind.or(file.bind) {
            Some(raw) => raw
                .parse::<SocketAddr>()
                .map_err(|e| Error::Config(format!("Invalid bind address {raw:?}: {e}")))?,
            None => defaults.bind_addr,
        };

        Ok(Self {
            bind_addr,
            database_path: overrides
                .database
                .or(file.database)
                .unwrap_or(defaults.database_path),
            refresh_interval_secs: overrides
                .refresh_interval_secs
                .or(file.refresh_interval_secs)
                .unwrap_or(defaults.refresh_interval_secs),
            sse_keep_alive_secs: file
                .sse_keep_alive_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.sse_keep_alive_secs),
        })
    }
}

fn parse_toml(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {e}")))
}

fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("teamplay").join("config.toml"))
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("teamplay"))
        .unwrap_or_else(|| PathBuf::from("./teamplay_data"))
        .join("teamplay.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::resolve(TomlConfig::default(), ConfigOverrides::default()).unwrap();
        assert_eq!(config.bind_addr.port(), 5750);
        assert_eq!(config.refresh_interval_secs, 60);
        assert!(config.database_path.ends_with("teamplay.db"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = parse_toml("bind = \"127.0.0.1:9000\"\nrefresh_interval_secs = 5\n").unwrap();
        let overrides = ConfigOverrides {
            bind: Some("127.0.0.1:9100".to_string()),
            ..Default::default()
        };
        let config = Config::resolve(file, overrides).unwrap();
        assert_eq!(config.bind_addr.port(), 9100);
        assert_eq!(config.refresh_interval_secs, 5);
    }

    #[test]
    fn test_invalid_bind_is_config_error() {
        let overrides = ConfigOverrides {
            bind: Some("localhost".to_string()),
            ..Default::default()
        };
        let err = Config::resolve(TomlConfig::default(), overrides).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(parse_toml("colour = \"blue\"").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let config = Config::load(Some(&missing), ConfigOverrides::default()).unwrap();
        assert_eq!(config.refresh_interval_secs, 60);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database = \"/tmp/teamplay-test.db\"").unwrap();
        writeln!(file, "sse_keep_alive_secs = 30").unwrap();
        let config = Config::load(Some(file.path()), ConfigOverrides::default()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/teamplay-test.db"));
        assert_eq!(config.sse_keep_alive_secs, 30);
    }
}
