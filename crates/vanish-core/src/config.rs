//! Configuration for the Vanish relay
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/vanish/relay.toml
//! - Linux: ~/.config/vanish/relay.toml
//! - Windows: %APPDATA%/vanish/relay.toml

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::messages::IceServer;
use crate::{COUNTER_TTL_SECS, MAX_FILE_SIZE, ROOM_TTL_SECS};

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// WebSocket port to listen on
    pub port: u16,
    /// Bind address
    pub bind: IpAddr,
    /// Destroy a room immediately when any participant leaves.
    ///
    /// When disabled the room keys are left to expire on their own TTL and a
    /// half-vacated room may sit in a one-participant state until then.
    pub destroy_on_leave: bool,
    /// Room existence key TTL in seconds
    pub room_ttl_secs: u64,
    /// Participant counter key TTL in seconds
    pub counter_ttl_secs: u64,
    /// Whether file transfer is enabled for new sessions
    pub file_sharing_enabled: bool,
    /// Maximum file size accepted for transfer, in bytes
    pub max_file_size: u64,
    /// ICE server descriptors handed to clients at room creation
    pub ice_servers: Vec<IceServer>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            destroy_on_leave: true,
            room_ttl_secs: ROOM_TTL_SECS,
            counter_ttl_secs: COUNTER_TTL_SECS,
            file_sharing_enabled: true,
            max_file_size: MAX_FILE_SIZE,
            ice_servers: vec![IceServer {
                urls: vec!["stun:stun.l.google.com:19302".into()],
                username: None,
                credential: None,
            }],
        }
    }
}

impl RelayConfig {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: RelayConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "vanish", "vanish")
            .map(|dirs| dirs.config_dir().join("relay.toml"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_else(|_| String::new())
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// I/O error
    Io(String),
    /// Parse error
    Parse(String),
    /// Serialization error
    Serialize(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.destroy_on_leave);
        assert_eq!(config.room_ttl_secs, 1800);
        assert_eq!(config.counter_ttl_secs, 1860);
        assert_eq!(config.max_file_size, 25_165_824);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            port = 9000
            destroy_on_leave = false
        "#;
        let config: RelayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port, 9000);
        assert!(!config.destroy_on_leave);
        // Other values should be defaults
        assert_eq!(config.room_ttl_secs, 1800);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = RelayConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: RelayConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.port, config.port);
        assert_eq!(parsed.ice_servers.len(), 1);
    }

    #[test]
    fn test_config_load_missing() {
        let config = RelayConfig::load_from(Path::new("/nonexistent/relay.toml")).unwrap();
        assert_eq!(config.port, 8080); // Should use defaults
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");

        let mut config = RelayConfig::default();
        config.port = 7777;
        config.save_to(&path).unwrap();

        let loaded = RelayConfig::load_from(&path).unwrap();
        assert_eq!(loaded.port, 7777);
    }

    #[test]
    fn test_sample_config() {
        let sample = RelayConfig::sample();
        assert!(sample.contains("port"));
        assert!(sample.contains("destroy_on_leave"));
    }
}
