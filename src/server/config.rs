//! Stream listener configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default loopback bind address with an ephemeral port
pub const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

/// Default cap on bytes waiting for a consumer's socket
pub const DEFAULT_MAX_CONSUMER_BACKLOG: usize = 8 * 1024 * 1024;

/// Per-session listener configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to; must be loopback
    pub bind_addr: SocketAddr,

    /// Enable TCP_NODELAY on consumer sockets
    pub tcp_nodelay: bool,

    /// Idle keepalive interval for the current consumer
    pub keepalive_interval: Duration,

    /// Consumers with more than this many unwritten bytes are dropped
    pub max_consumer_backlog: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            tcp_nodelay: true,
            keepalive_interval: Duration::from_secs(2),
            max_consumer_backlog: DEFAULT_MAX_CONSUMER_BACKLOG,
        }
    }
}

impl ServerConfig {
    /// Set the bind address
    ///
    /// Non-loopback addresses are replaced by `127.0.0.1` on the same port.
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = loopback_only(addr);
        self
    }

    /// Set TCP_NODELAY for consumer sockets
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set the idle keepalive interval
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the per-consumer backlog cap in bytes
    pub fn max_consumer_backlog(mut self, bytes: usize) -> Self {
        self.max_consumer_backlog = bytes;
        self
    }

    /// Address the listener will actually bind
    pub(crate) fn effective_bind_addr(&self) -> SocketAddr {
        loopback_only(self.bind_addr)
    }
}

fn loopback_only(addr: SocketAddr) -> SocketAddr {
    if addr.ip().is_loopback() {
        return addr;
    }
    tracing::warn!(
        requested = %addr,
        "Stream listener must bind loopback, using 127.0.0.1"
    );
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(config.bind_addr.port(), 0);
        assert!(config.tcp_nodelay);
        assert_eq!(config.keepalive_interval, Duration::from_secs(2));
        assert_eq!(config.max_consumer_backlog, 8 * 1024 * 1024);
    }

    #[test]
    fn test_builder_bind_loopback() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::default().bind(addr);

        assert_eq!(config.bind_addr, addr);
    }

    #[test]
    fn test_builder_bind_rejects_public() {
        let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let config = ServerConfig::default().bind(addr);

        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_effective_addr_after_field_write() {
        let config = ServerConfig {
            bind_addr: "10.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };

        assert!(config.effective_bind_addr().ip().is_loopback());
    }

    #[test]
    fn test_builder_chaining() {
        let config = ServerConfig::default()
            .tcp_nodelay(false)
            .keepalive_interval(Duration::from_millis(500))
            .max_consumer_backlog(64 * 1024);

        assert!(!config.tcp_nodelay);
        assert_eq!(config.keepalive_interval, Duration::from_millis(500));
        assert_eq!(config.max_consumer_backlog, 64 * 1024);
    }
}
