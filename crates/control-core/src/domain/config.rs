//! Server configuration types.
//!
//! [`ServerConfig`] holds everything a [`LineServer`] needs to know before it
//! starts listening.  It is a plain struct: the embedding application fills it
//! from CLI arguments or a config file, the domain never reads the
//! environment itself.
//!
//! [`LineServer`]: crate::infrastructure::listener::LineServer

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

/// Port used when no port is specified (the command port).
pub const DEFAULT_PORT: u16 = 20000;

/// Idle timeout used when none is specified.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Error type for invalid server configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A zero idle timeout would close every connection before its first request.
    #[error("idle timeout must be greater than zero")]
    ZeroIdleTimeout,
}

/// Runtime configuration for one line server.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use control_core::ServerConfig;
///
/// let cfg = ServerConfig::new(12345).with_idle_timeout(Duration::from_secs(3));
/// assert_eq!(cfg.bind_addr.port(), 12345);
/// assert_eq!(cfg.idle_timeout, Duration::from_secs(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address and port the listener binds to.
    ///
    /// Port `0` asks the OS for an ephemeral port; read the real one back with
    /// [`LineServer::local_addr`](crate::infrastructure::listener::LineServer::local_addr).
    pub bind_addr: SocketAddr,

    /// How long a connection may wait for its next request before it is closed.
    ///
    /// The timer restarts each time the server starts waiting for a request,
    /// so a peer that sends at least one line per window stays connected.
    pub idle_timeout: Duration,
}

impl ServerConfig {
    /// Listens on all IPv4 interfaces on `port` with the default idle timeout.
    pub fn new(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Listens on `bind_addr` with the default idle timeout.
    pub fn from_addr(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Returns a copy with the bind address replaced.
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Returns a copy with the idle timeout replaced.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Checks the invariants the listener relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroIdleTimeout`] if `idle_timeout` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    /// | Field        | Default         |
    /// |--------------|-----------------|
    /// | bind_addr    | `0.0.0.0:20000` |
    /// | idle_timeout | 60 seconds      |
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_20000() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr.port(), 20000);
    }

    #[test]
    fn test_default_binds_all_interfaces() {
        let cfg = ServerConfig::default();
        assert!(cfg.bind_addr.ip().is_unspecified());
    }

    #[test]
    fn test_default_idle_timeout_is_60s() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_builders_override_fields() {
        // Arrange / Act
        let cfg = ServerConfig::new(1)
            .with_bind_addr("127.0.0.1:9000".parse().unwrap())
            .with_idle_timeout(Duration::from_secs(3));

        // Assert
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.idle_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_from_addr_keeps_address_and_default_timeout() {
        let cfg = ServerConfig::from_addr("127.0.0.1:0".parse().unwrap());
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:0");
        assert_eq!(cfg.idle_timeout, DEFAULT_IDLE_TIMEOUT);
    }

    #[test]
    fn test_validate_accepts_huge_idle_timeout() {
        let cfg = ServerConfig::default().with_idle_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn test_validate_accepts_default() {
        assert_eq!(ServerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_zero_idle_timeout() {
        let cfg = ServerConfig::default().with_idle_timeout(Duration::ZERO);
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroIdleTimeout));
    }
}
