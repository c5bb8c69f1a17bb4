//! Configuration management for the databus relay
//!
//! TOML configuration file support with `DATABUS_*` environment variable
//! overrides and defaults for every field.
//!
//! ```toml
//! [bus]
//! listen_path = "/run/databus/peer.sock"
//! relay_path = "/run/databus/relay.sock"
//!
//! [storage]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379"
//! consistency = "quorum"
//! replicas = 2
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bus::{DatabusConfig, OverflowStrategy};
use crate::error::Error;
use crate::protocol::{CodecConfig, DEFAULT_MAX_PACKET};
use crate::resilience::RetryPolicy;
use crate::storage::{ConsistencyLevel, RedisBackendConfig, TimeBasis};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Databus sockets and queueing
    #[serde(default)]
    pub bus: BusConfig,

    /// Wire protocol limits
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Storage backend and addressing
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retry policy for storage writes
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Databus configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusConfig {
    /// Socket this peer listens on
    #[serde(default = "default_listen_path")]
    pub listen_path: PathBuf,

    /// Relay endpoint for outbound packets
    #[serde(default = "default_relay_path")]
    pub relay_path: PathBuf,

    /// Multicast endpoint to announce the listen socket to
    #[serde(default)]
    pub announce_path: Option<PathBuf>,

    /// Delay before reconnecting in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Maximum messages per outbound packet
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum queued outbound messages
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,

    /// What to drop when the queue is full
    #[serde(default)]
    pub overflow: OverflowStrategy,

    /// Largest accepted inbound datagram
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,

    /// Command channel capacity
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

/// Protocol configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// Maximum `data` payload size in bytes
    #[serde(default = "default_max_packet")]
    pub max_packet: usize,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process store, lost on exit
    #[default]
    Memory,
    /// Redis server
    Redis,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "redis" => Ok(BackendKind::Redis),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Persist bus events through the storage sink
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Backend to write to
    #[serde(default)]
    pub backend: BackendKind,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Write consistency level
    #[serde(default)]
    pub consistency: ConsistencyLevel,

    /// Replicas behind the Redis primary
    #[serde(default)]
    pub replicas: usize,

    /// Replica acknowledgement timeout in milliseconds
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Calendar for day keys and slots
    #[serde(default)]
    pub time_basis: TimeBasis,

    /// Events buffered between the bus and the storage writer
    #[serde(default = "default_sink_buffer")]
    pub sink_buffer: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace); `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Include the event target in log lines
    #[serde(default = "default_true")]
    pub with_target: bool,
}

// Default value functions
fn default_listen_path() -> PathBuf { PathBuf::from("/run/databus/peer.sock") }
fn default_relay_path() -> PathBuf { PathBuf::from("/run/databus/relay.sock") }
fn default_reconnect_delay_ms() -> u64 { 1000 }
fn default_batch_size() -> usize { 10 }
fn default_queue_limit() -> usize { 100_000 }
fn default_recv_buffer_size() -> usize { 32 * 1024 }
fn default_command_buffer() -> usize { 1024 }
fn default_max_packet() -> usize { DEFAULT_MAX_PACKET }
fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_wait_timeout_ms() -> u64 { 100 }
fn default_sink_buffer() -> usize { 10_000 }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            listen_path: default_listen_path(),
            relay_path: default_relay_path(),
            announce_path: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            batch_size: default_batch_size(),
            queue_limit: default_queue_limit(),
            overflow: OverflowStrategy::default(),
            recv_buffer_size: default_recv_buffer_size(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_packet: default_max_packet(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: BackendKind::default(),
            redis_url: default_redis_url(),
            consistency: ConsistencyLevel::default(),
            replicas: 0,
            wait_timeout_ms: default_wait_timeout_ms(),
            time_basis: TimeBasis::default(),
            sink_buffer: default_sink_buffer(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file {}: {}", path, e))
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self, String> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `path` (or defaults when `None`) with environment overrides,
    /// then validate
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let config = match path {
            Some(path) => Self::from_file_with_env(&path.to_string_lossy())
                .map_err(Error::Configuration)?,
            None => Self::from_env(),
        };
        config.validate().map_err(Error::Configuration)?;
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        // Bus
        if let Ok(path) = std::env::var("DATABUS_LISTEN") {
            self.bus.listen_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("DATABUS_RELAY") {
            self.bus.relay_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("DATABUS_ANNOUNCE") {
            self.bus.announce_path = Some(PathBuf::from(path));
        }
        if let Ok(size) = std::env::var("DATABUS_BATCH_SIZE") {
            if let Ok(s) = size.parse() {
                self.bus.batch_size = s;
            }
        }
        if let Ok(limit) = std::env::var("DATABUS_QUEUE_LIMIT") {
            if let Ok(l) = limit.parse() {
                self.bus.queue_limit = l;
            }
        }

        // Protocol
        if let Ok(max) = std::env::var("DATABUS_MAX_PACKET") {
            if let Ok(m) = max.parse() {
                self.protocol.max_packet = m;
            }
        }

        // Storage
        if let Ok(backend) = std::env::var("DATABUS_STORAGE_BACKEND") {
            if let Ok(b) = backend.parse() {
                self.storage.backend = b;
            }
        }
        if let Ok(url) = std::env::var("DATABUS_REDIS_URL") {
            self.storage.redis_url = url;
        }
        if let Ok(level) = std::env::var("DATABUS_CONSISTENCY") {
            if let Ok(l) = level.parse() {
                self.storage.consistency = l;
            }
        }
        if let Ok(basis) = std::env::var("DATABUS_TIME_BASIS") {
            if let Ok(b) = basis.parse() {
                self.storage.time_basis = b;
            }
        }

        // Retry
        if let Ok(retries) = std::env::var("DATABUS_RETRIES") {
            if let Ok(r) = retries.parse() {
                self.retry.retries = r;
            }
        }

        // Logging
        if let Ok(level) = std::env::var("DATABUS_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.bus_config().validate()?;

        if self.bus.listen_path.as_os_str().is_empty() {
            return Err("Listen path cannot be empty".to_string());
        }
        if self.bus.relay_path.as_os_str().is_empty() {
            return Err("Relay path cannot be empty".to_string());
        }

        if self.protocol.max_packet == 0 {
            return Err("Max packet must be > 0".to_string());
        }
        if self.protocol.max_packet > self.bus.recv_buffer_size {
            return Err(format!(
                "Max packet ({}) cannot exceed recv_buffer_size ({})",
                self.protocol.max_packet, self.bus.recv_buffer_size
            ));
        }

        if self.storage.backend == BackendKind::Redis && self.storage.redis_url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }
        if self.storage.sink_buffer == 0 {
            return Err("Sink buffer must be > 0".to_string());
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(format!("Unknown log level: {}", self.logging.level));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: &str) -> Result<(), String> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        std::fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file {}: {}", path, e))
    }

    /// Codec limits
    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            max_packet: self.protocol.max_packet,
        }
    }

    /// Databus settings
    pub fn bus_config(&self) -> DatabusConfig {
        DatabusConfig {
            listen_path: self.bus.listen_path.clone(),
            relay_path: self.bus.relay_path.clone(),
            announce_path: self.bus.announce_path.clone(),
            reconnect_delay: Duration::from_millis(self.bus.reconnect_delay_ms),
            batch_size: self.bus.batch_size,
            queue_limit: self.bus.queue_limit,
            overflow: self.bus.overflow,
            recv_buffer_size: self.bus.recv_buffer_size,
            command_buffer: self.bus.command_buffer,
            codec: self.codec_config(),
        }
    }

    /// Storage engine settings
    pub fn storage_config(&self) -> crate::storage::StorageConfig {
        crate::storage::StorageConfig {
            consistency: self.storage.consistency,
            time_basis: self.storage.time_basis,
        }
    }

    /// Redis backend settings
    pub fn redis_config(&self) -> RedisBackendConfig {
        RedisBackendConfig::with_url(self.storage.redis_url.clone())
            .replicas(self.storage.replicas)
            .wait_timeout(Duration::from_millis(self.storage.wait_timeout_ms))
    }

    /// Retry policy for storage writes
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bus.batch_size, 10);
        assert_eq!(config.bus.reconnect_delay_ms, 1000);
        assert_eq!(config.protocol.max_packet, 32 * 1024);
        assert_eq!(config.storage.backend, BackendKind::Memory);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_batch_size() {
        let mut config = Config::default();
        config.bus.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [bus]
            batch_size = 20

            [storage]
            backend = "redis"
            consistency = "quorum"
            replicas = 2
            time_basis = "utc"

            [retry]
            retries = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.bus.batch_size, 20);
        assert_eq!(config.bus.queue_limit, 100_000);
        assert_eq!(config.storage.backend, BackendKind::Redis);
        assert_eq!(config.storage_config().time_basis, TimeBasis::Utc);
        assert_eq!(config.redis_config().replicas, 2);
        assert_eq!(config.retry_policy().retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bus_config_conversion() {
        let mut config = Config::default();
        config.bus.reconnect_delay_ms = 250;
        config.protocol.max_packet = 1024;

        let bus = config.bus_config();
        assert_eq!(bus.reconnect_delay, Duration::from_millis(250));
        assert_eq!(bus.codec.max_packet, 1024);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("databus.toml");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.bus.announce_path = Some(PathBuf::from("/run/databus/multicast.sock"));
        config.save_to_file(path).unwrap();

        let loaded = Config::from_file(path).unwrap();
        assert_eq!(loaded.bus.announce_path, config.bus.announce_path);
        assert_eq!(loaded.retry, config.retry);
    }

    #[test]
    fn test_load_reports_configuration_errors() {
        let dir = TempDir::new().unwrap();

        let invalid = dir.path().join("invalid.toml");
        std::fs::write(&invalid, "[bus]\nbatch_size = 0\n").unwrap();
        assert!(matches!(Config::load(Some(&invalid)), Err(Error::Configuration(_))));

        let missing = dir.path().join("missing.toml");
        let err = Config::load(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));

        let valid = dir.path().join("valid.toml");
        std::fs::write(&valid, "[bus]\nbatch_size = 5\n").unwrap();
        assert_eq!(Config::load(Some(&valid)).unwrap().bus.batch_size, 5);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("DATABUS_QUEUE_LIMIT", "500");
        let config = Config::from_env();
        assert_eq!(config.bus.queue_limit, 500);
        std::env::remove_var("DATABUS_QUEUE_LIMIT");
    }
}
