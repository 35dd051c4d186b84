//! Configuration types for the Pluto counter service
//!
//! Everything here is fixed at process start. Nothing in the crate mutates
//! a configuration after the engine has been built from it.

use serde::{Deserialize, Serialize};

/// Largest payload a single IPv4 UDP datagram can carry
const MAX_UDP_PAYLOAD: usize = 65_507;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlutoConfig {
    /// Maintenance threshold applied to every device's current count
    #[serde(default = "default_threshold")]
    pub threshold: i64,

    /// Datagram listener configuration
    #[serde(default)]
    pub udp: UdpConfig,

    /// Administrative reload endpoint configuration
    #[serde(default)]
    pub admin: AdminConfig,

    /// Device store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl PlutoConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            threshold: default_threshold(),
            udp: UdpConfig::default(),
            admin: AdminConfig::default(),
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the maintenance threshold
    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the store configuration
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.threshold < 1 {
            return Err(crate::Error::config(format!(
                "Maintenance threshold must be >= 1, got {}",
                self.threshold
            )));
        }

        self.udp.validate()?;
        self.store.validate()?;
        self.engine.validate()?;

        if self.admin.enabled && self.admin.port != 0 && self.admin.port == self.udp.port {
            return Err(crate::Error::config(format!(
                "UDP and admin listeners cannot share port {}",
                self.udp.port
            )));
        }

        Ok(())
    }
}

impl Default for PlutoConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Datagram listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Address to bind (e.g., "0.0.0.0")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// UDP port (0 picks an ephemeral port)
    #[serde(default = "default_udp_port")]
    pub port: u16,

    /// Receive buffer size; longer datagrams are truncated
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

impl UdpConfig {
    /// Socket address string for binding
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.bind_addr.is_empty() {
            return Err(crate::Error::config("UDP bind address cannot be empty"));
        }
        if self.max_datagram_size == 0 || self.max_datagram_size > MAX_UDP_PAYLOAD {
            return Err(crate::Error::config(format!(
                "Datagram size must be between 1 and {}, got {}",
                MAX_UDP_PAYLOAD, self.max_datagram_size
            )));
        }
        Ok(())
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_udp_port(),
            max_datagram_size: default_max_datagram_size(),
        }
    }
}

/// Administrative reload endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Whether the reload endpoint is served at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Address to bind
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// TCP port for the reload endpoint
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

impl AdminConfig {
    /// Socket address string for binding
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind_addr: default_bind_addr(),
            port: default_admin_port(),
        }
    }
}

/// Device store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-backed store rooted at a directory
    File {
        /// Directory holding `devices.json` and `events.jsonl`
        dir: String,
    },

    /// In-memory store (not persistent)
    Memory,
}

impl StoreConfig {
    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
        }
    }

    fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { dir } if dir.trim().is_empty() => {
                Err(crate::Error::config("File store directory cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            dir: default_store_dir(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between periodic statistics lines (in seconds)
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    /// A device counts as active when seen within this window (in seconds)
    #[serde(default = "default_active_window_secs")]
    pub active_window_secs: u64,

    /// Capacity of the internal monitoring event channel
    ///
    /// When full, new events are dropped (with a warning log) so the
    /// datagram path never waits on a slow consumer.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.stats_interval_secs == 0 {
            return Err(crate::Error::config("Stats interval must be > 0"));
        }
        if self.active_window_secs == 0 {
            return Err(crate::Error::config("Active window must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval_secs(),
            active_window_secs: default_active_window_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_threshold() -> i64 {
    5000
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_udp_port() -> u16 {
    8080
}

fn default_admin_port() -> u16 {
    8081
}

fn default_max_datagram_size() -> usize {
    crate::protocol::MAX_DATAGRAM_SIZE
}

fn default_enabled() -> bool {
    true
}

fn default_store_dir() -> String {
    "pluto-data".to_string()
}

fn default_stats_interval_secs() -> u64 {
    300
}

fn default_active_window_secs() -> u64 {
    600
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployed_service() {
        let config = PlutoConfig::default();
        assert_eq!(config.threshold, 5000);
        assert_eq!(config.udp.port, 8080);
        assert_eq!(config.admin.port, 8081);
        assert_eq!(config.udp.max_datagram_size, 64);
        assert_eq!(config.engine.stats_interval_secs, 300);
        assert_eq!(config.engine.active_window_secs, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_threshold() {
        assert!(PlutoConfig::new().with_threshold(0).validate().is_err());
        assert!(PlutoConfig::new().with_threshold(-5).validate().is_err());
        assert!(PlutoConfig::new().with_threshold(1).validate().is_ok());
    }

    #[test]
    fn rejects_shared_listener_port() {
        let mut config = PlutoConfig::new();
        config.admin.port = config.udp.port;
        assert!(config.validate().is_err());

        // Ephemeral ports never collide
        config.udp.port = 0;
        config.admin.port = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_store_dir() {
        let config = PlutoConfig::new().with_store(StoreConfig::File { dir: " ".into() });
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_partial_document() {
        let config: PlutoConfig = serde_json::from_str(
            r#"{"threshold": 5, "store": {"type": "memory"}, "udp": {"port": 9000}}"#,
        )
        .unwrap();

        assert_eq!(config.threshold, 5);
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.udp.port, 9000);
        assert_eq!(config.udp.max_datagram_size, 64);
        assert_eq!(config.admin.port, 8081);
    }
}
