//! Server configuration.

use std::net::SocketAddr;

/// Default port of the reference remote.
pub const DEFAULT_PORT: u16 = 8787;

/// Configuration for the remote server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum accepted request body, in bytes.
    pub max_body_bytes: usize,
    /// Whether `/health` reports the server as reachable.
    pub healthy: bool,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_body_bytes: 8 * 1024 * 1024,
            healthy: true,
        }
    }

    /// Configuration bound to an ephemeral loopback port.
    pub fn ephemeral() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    /// Sets the maximum request body size.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Starts the server reporting itself unhealthy.
    pub fn with_healthy(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert!(config.healthy);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_max_body_bytes(1024)
            .with_healthy(false);

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.max_body_bytes, 1024);
        assert!(!config.healthy);
        assert_eq!(ServerConfig::ephemeral().bind_addr.port(), 0);
    }
}
