//! # Configuration Management
//!
//! Centralized configuration for the chunk transport core.
//!
//! This module provides the wire-format constants shared by the framing
//! layer and a structured configuration for transports: receive buffer
//! sizing, connect timeout, and buffer-pool capacity.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-variable overrides via `from_env()`
//!
//! ## Security Considerations
//! - The receive buffer size is an upper bound on any chunk a peer can make
//!   this core hold in memory; a declared length above it is rejected before
//!   a single body byte is accepted.
//! - The connect timeout bounds how long a dual-stack race can hold
//!   half-open sockets.

use crate::error::{Result, TransportError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Size of the fixed chunk header: 4-byte message type code followed by a
/// 4-byte little-endian total length.
pub const HEADER_SIZE: usize = 8;

/// Byte offset of the little-endian length field within the chunk header.
pub const LENGTH_FIELD_OFFSET: usize = 4;

/// Well-known TCP port of the protocol, used when an endpoint URL carries
/// no usable port.
pub const DEFAULT_PORT: u16 = 4840;

/// Default capacity of one receive buffer (and therefore the largest chunk
/// a transport will accept).
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 64 * 1024;

/// Default number of pre-allocated buffers in a pool.
pub const DEFAULT_POOL_CAPACITY: usize = 16;

/// Default time budget for the dual-stack connect race.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Transport configuration shared by every socket built from it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Capacity in bytes of one chunk buffer; also the maximum accepted
    /// declared chunk length.
    #[serde(default = "default_receive_buffer_size")]
    pub receive_buffer_size: usize,

    /// Time budget for resolving and racing connect attempts.
    #[serde(default = "default_connect_timeout", with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Number of buffers pre-allocated by a pool built from this config.
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
}

fn default_receive_buffer_size() -> usize {
    DEFAULT_RECEIVE_BUFFER_SIZE
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_pool_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

/// Serialize durations as integer milliseconds in TOML.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl TransportConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| TransportError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| TransportError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TransportError::ConfigError(format!("Failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(size) = std::env::var("CHUNK_TRANSPORT_RECEIVE_BUFFER_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.receive_buffer_size = val;
            }
        }

        if let Ok(timeout) = std::env::var("CHUNK_TRANSPORT_CONNECT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.connect_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(capacity) = std::env::var("CHUNK_TRANSPORT_POOL_CAPACITY") {
            if let Ok(val) = capacity.parse::<usize>() {
                config.pool_capacity = val;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the transport cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.receive_buffer_size < HEADER_SIZE {
            return Err(TransportError::ConfigError(format!(
                "receive_buffer_size must be at least {HEADER_SIZE} bytes, got {}",
                self.receive_buffer_size
            )));
        }

        if self.connect_timeout.is_zero() {
            return Err(TransportError::ConfigError(
                "connect_timeout must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
