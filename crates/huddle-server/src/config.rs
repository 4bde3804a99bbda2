//! Runtime configuration.

use std::time::Duration;

use crate::hasher::HashConfig;

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Lines that may wait in a connection's outbound queue before further
    /// deliveries to it are dropped
    pub outbound_queue: usize,
    /// Longest accepted inbound line in bytes, excluding the newline
    pub max_line_bytes: usize,
    /// How long a closing connection may take to flush queued lines
    pub drain_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { outbound_queue: 256, max_line_bytes: 4096, drain_timeout: Duration::from_secs(5) }
    }
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080")
    pub bind_address: String,
    /// Maximum concurrent connections; further connections are told the
    /// server is full and closed
    pub max_connections: usize,
    /// Per-connection limits
    pub connection: ConnectionConfig,
    /// Password hashing costs
    pub hash: HashConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            connection: ConnectionConfig::default(),
            hash: HashConfig::default(),
        }
    }
}
