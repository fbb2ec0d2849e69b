//! Configuration system for the Pylon server binary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pylon configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// STUN responder configuration
    pub stun: StunConfig,
    /// TURN allocator configuration
    pub turn: TurnConfig,
    /// WebSocket signaling configuration
    pub signaling: SignalingConfig,
    /// HTTP announce tracker configuration
    pub tracker: TrackerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// STUN responder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StunConfig {
    /// Enable the STUN responder
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// UDP listen address
    #[serde(default = "default_stun_listen")]
    pub listen_addr: String,
}

/// TURN allocator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Enable the TURN allocator
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// UDP listen address
    #[serde(default = "default_turn_listen")]
    pub listen_addr: String,
    /// Address advertised in relayed-address replies
    #[serde(default = "default_relay_ip")]
    pub relay_ip: String,
    /// First relay port
    #[serde(default = "default_relay_port_min")]
    pub relay_port_min: u16,
    /// Last relay port
    #[serde(default = "default_relay_port_max")]
    pub relay_port_max: u16,
    /// Allocation lifetime in seconds
    #[serde(default = "default_allocation_lifetime")]
    pub allocation_lifetime_secs: u64,
    /// Static username/password table; empty disables authentication
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

/// WebSocket signaling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Enable the signaling gateway
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// HTTP listen address
    #[serde(default = "default_signaling_listen")]
    pub listen_addr: String,
    /// Server-wide connection cap
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Largest accepted frame in bytes
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Room size cap
    #[serde(default = "default_max_room_members")]
    pub max_room_members: usize,
    /// Connections allowed per IP per minute
    #[serde(default = "default_rate_max")]
    pub connections_per_minute: usize,
}

/// HTTP announce tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Enable the tracker
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// HTTP listen address
    #[serde(default = "default_tracker_listen")]
    pub listen_addr: String,
    /// Re-announce interval handed to clients, seconds
    #[serde(default = "default_announce_interval")]
    pub announce_interval_secs: u64,
    /// A peer silent this long is reaped, seconds
    #[serde(default = "default_peer_timeout")]
    pub peer_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_true() -> bool {
    true
}

fn default_stun_listen() -> String {
    "0.0.0.0:3478".to_string()
}

fn default_turn_listen() -> String {
    "0.0.0.0:3479".to_string()
}

fn default_relay_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_relay_port_min() -> u16 {
    49152
}

fn default_relay_port_max() -> u16 {
    49407
}

fn default_allocation_lifetime() -> u64 {
    600
}

fn default_signaling_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_max_frame_bytes() -> usize {
    64 * 1024
}

fn default_max_room_members() -> usize {
    64
}

fn default_rate_max() -> usize {
    30
}

fn default_tracker_listen() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_announce_interval() -> u64 {
    120
}

fn default_peer_timeout() -> u64 {
    1800
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StunConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_stun_listen(),
        }
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_turn_listen(),
            relay_ip: default_relay_ip(),
            relay_port_min: default_relay_port_min(),
            relay_port_max: default_relay_port_max(),
            allocation_lifetime_secs: default_allocation_lifetime(),
            credentials: HashMap::new(),
        }
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_signaling_listen(),
            max_connections: default_max_connections(),
            max_frame_bytes: default_max_frame_bytes(),
            max_room_members: default_max_room_members(),
            connections_per_minute: default_rate_max(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_tracker_listen(),
            announce_interval_secs: default_announce_interval(),
            peer_timeout_secs: default_peer_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("pylon/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_addr(&self.stun.listen_addr, "stun.listen_addr")?;
        self.parse_addr(&self.turn.listen_addr, "turn.listen_addr")?;
        self.parse_addr(&self.signaling.listen_addr, "signaling.listen_addr")?;
        self.parse_addr(&self.tracker.listen_addr, "tracker.listen_addr")?;

        self.turn
            .relay_ip
            .parse::<std::net::IpAddr>()
            .map_err(|_| anyhow::anyhow!("Invalid turn.relay_ip: {}", self.turn.relay_ip))?;

        if self.turn.relay_port_min > self.turn.relay_port_max {
            anyhow::bail!(
                "turn.relay_port_min ({}) exceeds turn.relay_port_max ({})",
                self.turn.relay_port_min,
                self.turn.relay_port_max
            );
        }

        if self.turn.allocation_lifetime_secs == 0 {
            anyhow::bail!("turn.allocation_lifetime_secs must be positive");
        }

        if self.signaling.max_connections == 0 {
            anyhow::bail!("signaling.max_connections must be positive");
        }

        if self.signaling.max_room_members == 0 {
            anyhow::bail!("signaling.max_room_members must be positive");
        }

        if self.tracker.announce_interval_secs == 0 {
            anyhow::bail!("tracker.announce_interval_secs must be positive");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    fn parse_addr(&self, addr: &str, name: &str) -> anyhow::Result<SocketAddr> {
        addr.parse()
            .map_err(|_| anyhow::anyhow!("Invalid {}: {}", name, addr))
    }

    /// STUN listen address as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn stun_addr(&self) -> anyhow::Result<SocketAddr> {
        self.parse_addr(&self.stun.listen_addr, "stun.listen_addr")
    }

    /// TURN listen address as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn turn_addr(&self) -> anyhow::Result<SocketAddr> {
        self.parse_addr(&self.turn.listen_addr, "turn.listen_addr")
    }

    /// Signaling listen address as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn signaling_addr(&self) -> anyhow::Result<SocketAddr> {
        self.parse_addr(&self.signaling.listen_addr, "signaling.listen_addr")
    }

    /// Tracker listen address as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn tracker_addr(&self) -> anyhow::Result<SocketAddr> {
        self.parse_addr(&self.tracker.listen_addr, "tracker.listen_addr")
    }

    /// Build the TURN allocator settings from this config.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay IP cannot be parsed.
    pub fn turn_settings(&self) -> anyhow::Result<pylon_nat::TurnConfig> {
        Ok(pylon_nat::TurnConfig {
            relay_ip: self.turn.relay_ip.parse()?,
            port_range: self.turn.relay_port_min..=self.turn.relay_port_max,
            default_lifetime: Duration::from_secs(self.turn.allocation_lifetime_secs),
            credentials: self.turn.credentials.clone(),
            ..pylon_nat::TurnConfig::default()
        })
    }

    /// Build the signaling gateway settings from this config.
    #[must_use]
    pub fn signaling_settings(&self) -> pylon_swarm::SignalingConfig {
        pylon_swarm::SignalingConfig {
            max_connections: self.signaling.max_connections,
            max_frame_bytes: self.signaling.max_frame_bytes,
            rate_max_connections: self.signaling.connections_per_minute,
            ..pylon_swarm::SignalingConfig::default()
        }
    }

    /// Build the registry settings for the signaling gateway.
    #[must_use]
    pub fn registry_settings(&self) -> pylon_swarm::RegistryConfig {
        pylon_swarm::RegistryConfig {
            max_group_members: self.signaling.max_room_members,
            ..pylon_swarm::RegistryConfig::default()
        }
    }

    /// Build the tracker settings from this config.
    #[must_use]
    pub fn tracker_settings(&self) -> pylon_swarm::TrackerConfig {
        pylon_swarm::TrackerConfig {
            announce_interval: self.tracker.announce_interval_secs,
            peer_timeout: Duration::from_secs(self.tracker.peer_timeout_secs),
            ..pylon_swarm::TrackerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stun.listen_addr, "0.0.0.0:3478");
        assert_eq!(config.turn.relay_port_min, 49152);
        assert_eq!(config.signaling.max_connections, 1024);
        assert!(config.tracker.enabled);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.turn.relay_port_min = 50000;
        config.turn.relay_port_max = 49000;
        assert!(config.validate().is_err());

        config.turn.relay_port_min = 49152;
        config.turn.relay_port_max = 49407;
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.stun.listen_addr, deserialized.stun.listen_addr);
        assert_eq!(
            config.tracker.announce_interval_secs,
            deserialized.tracker.announce_interval_secs
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [signaling]
            listen_addr = "127.0.0.1:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.signaling.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.signaling.max_connections, 1024);
        assert!(config.stun.enabled);
    }
}
