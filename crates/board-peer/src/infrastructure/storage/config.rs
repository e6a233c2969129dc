//! TOML-based configuration for the peer application.
//!
//! Reads and writes [`PeerConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\BoardMesh\config.toml`
//! - Linux:    `~/.config/boardmesh/config.toml`
//! - macOS:    `~/Library/Application Support/BoardMesh/config.toml`
//!
//! Every field carries a serde default so the application works on first run
//! (before a config file exists) and keeps working when an older file lacks
//! newer fields.

use std::path::PathBuf;
use std::time::Duration;

use board_core::{BoardIdError, PeerAddr};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A configured host is not usable as a peer identity.
    #[error("invalid address in config: {0}")]
    InvalidAddress(#[from] BoardIdError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level peer configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PeerConfig {
    #[serde(default)]
    pub peer: PeerSection,
    #[serde(default)]
    pub network: NetworkSection,
}

/// General peer behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether to create an initial board at startup.
    #[serde(default = "default_true")]
    pub create_initial_board: bool,
}

/// Network addresses and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// TCP port the peer listener binds (and the port other peers dial).
    #[serde(default = "default_peer_port")]
    pub peer_port: u16,
    /// IP address to bind the listener to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// The host other peers reach this process at; prefixes every board id
    /// this peer creates.
    #[serde(default = "default_advertised_host")]
    pub advertised_host: String,
    /// Rendezvous server host.
    #[serde(default = "default_advertised_host")]
    pub rendezvous_host: String,
    /// Rendezvous server port.
    #[serde(default = "default_rendezvous_port")]
    pub rendezvous_port: u16,
    /// Timeout in seconds for dialing peers and the rendezvous server.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Delay in seconds between rendezvous reconnect attempts.
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_peer_port() -> u16 {
    4171
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_advertised_host() -> String {
    "127.0.0.1".to_string()
}
fn default_rendezvous_port() -> u16 {
    4170
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_reconnect_interval_secs() -> u64 {
    5
}

impl Default for PeerSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            create_initial_board: default_true(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            peer_port: default_peer_port(),
            bind_address: default_bind_address(),
            advertised_host: default_advertised_host(),
            rendezvous_host: default_advertised_host(),
            rendezvous_port: default_rendezvous_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
        }
    }
}

impl NetworkSection {
    /// The identity this peer advertises: `advertised_host:peer_port`.
    pub fn self_addr(&self) -> Result<PeerAddr, ConfigError> {
        Ok(PeerAddr::new(self.advertised_host.clone(), self.peer_port)?)
    }

    /// The rendezvous server address.
    pub fn rendezvous_addr(&self) -> Result<PeerAddr, ConfigError> {
        Ok(PeerAddr::new(
            self.rendezvous_host.clone(),
            self.rendezvous_port,
        )?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`PeerConfig`] from disk, returning `PeerConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<PeerConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: PeerConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PeerConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the config directory if needed.
pub fn save_config(config: &PeerConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("BoardMesh"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("boardmesh"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("BoardMesh")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_expected_ports() {
        let cfg = PeerConfig::default();
        assert_eq!(cfg.network.peer_port, 4171);
        assert_eq!(cfg.network.rendezvous_port, 4170);
    }

    #[test]
    fn test_default_self_addr_is_loopback() {
        let cfg = PeerConfig::default();
        let addr = cfg.network.self_addr().unwrap();
        assert_eq!(addr.host(), "127.0.0.1");
        assert_eq!(addr.port(), 4171);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = PeerConfig::default();
        cfg.network.peer_port = 9000;
        cfg.peer.log_level = "debug".to_string();

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: PeerConfig = toml::from_str(&toml_str).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: PeerConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, PeerConfig::default());
    }

    #[test]
    fn test_partial_network_section_overrides_only_named_fields() {
        let toml_str = r#"
[network]
peer_port = 5555
"#;
        let cfg: PeerConfig = toml::from_str(toml_str).expect("deserialize partial");
        assert_eq!(cfg.network.peer_port, 5555);
        assert_eq!(cfg.network.rendezvous_port, 4170);
        assert_eq!(cfg.peer.log_level, "info");
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let result: Result<PeerConfig, toml::de::Error> = toml::from_str("[[[ not toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_self_addr_rejects_host_with_reserved_character() {
        let mut cfg = PeerConfig::default();
        cfg.network.advertised_host = "bad:host".to_string();
        assert!(matches!(
            cfg.network.self_addr(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_timeouts_convert_to_durations() {
        let cfg = PeerConfig::default();
        assert_eq!(cfg.network.connect_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.network.reconnect_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_file() {
        let dir = std::env::temp_dir().join(format!(
            "boardmesh_test_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let mut cfg = PeerConfig::default();
        cfg.network.peer_port = 12345;

        let content = toml::to_string_pretty(&cfg).unwrap();
        std::fs::write(&path, &content).unwrap();
        let loaded: PeerConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(loaded.network.peer_port, 12345);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"));
        }
        // NoPlatformConfigDir in a stripped environment is also acceptable.
    }
}
