//! Lifecycle of the command and debug ports.
//!
//! [`ControlPorts::start`] binds both `LineServer`s on the given runtime and
//! returns once they are accepting; [`ControlPorts::stop`] shuts both down
//! and waits for their sessions to end.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use control_core::{LineClient, LineServer, ServerConfig, ServerHandle};
use tokio::runtime::Handle;
use tracing::info;

use crate::application::handlers::{command_port_handler, DebugPortHandler};
use crate::domain::config::AppConfig;

/// The running command port and, when enabled, the debug port.
pub struct ControlPorts {
    command: ServerHandle,
    debug: Option<ServerHandle>,
}

impl ControlPorts {
    /// Starts the command port, and the debug port if its port is non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if `bind_address` is not an IP address or if either
    /// port cannot be bound.
    pub fn start(runtime: &Handle, config: &AppConfig) -> anyhow::Result<Self> {
        let ip: IpAddr = config
            .bind_address
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", config.bind_address))?;

        let command_addr = SocketAddr::new(ip, config.command_port.port);
        let command_config = ServerConfig::from_addr(command_addr)
            .with_idle_timeout(config.command_port.idle_timeout());
        let command_handler = command_port_handler(&config.command_port);
        let max_clients = command_handler.registry().max_clients();
        let command = LineServer::bind(runtime, command_config, Arc::new(command_handler))
            .context("failed to start command port")?
            .start();
        let addr = command.local_addr();
        match max_clients {
            Some(max) => info!("command port listening on {addr} (max {max} clients)"),
            None => info!("command port listening on {addr} (no client limit)"),
        }

        let debug = if config.debug_port.enabled() {
            let debug_addr = SocketAddr::new(ip, config.debug_port.port);
            let debug_config = ServerConfig::from_addr(debug_addr)
                .with_idle_timeout(config.debug_port.idle_timeout());
            let handle = LineServer::bind(runtime, debug_config, Arc::new(DebugPortHandler))
                .context("failed to start debug port")?
                .start();
            info!("debug port listening on {}", handle.local_addr());
            Some(handle)
        } else {
            info!("debug port disabled");
            None
        };

        Ok(Self { command, debug })
    }

    pub fn command_addr(&self) -> SocketAddr {
        self.command.local_addr()
    }

    pub fn debug_addr(&self) -> Option<SocketAddr> {
        self.debug.as_ref().map(ServerHandle::local_addr)
    }

    /// Shuts both ports down and waits for every session to end.
    ///
    /// # Errors
    ///
    /// Returns the first accept-loop error, after both ports were stopped.
    pub async fn stop(self) -> anyhow::Result<()> {
        self.command.shutdown();
        if let Some(debug) = &self.debug {
            debug.shutdown();
        }

        let command = self.command.join().await.context("command port failed");
        let debug = match self.debug {
            Some(debug) => debug.join().await.context("debug port failed"),
            None => Ok(()),
        };
        info!("control ports stopped");
        command.and(debug)
    }
}

/// Connects to `addr`, sends one request, and returns the reply line.
///
/// Returns `Ok(None)` when the server closed the connection without
/// answering, which is how the command port reacts to an unknown request.
/// A greeting, if the server sends one, is skipped when `expect_greeting` is
/// set.
///
/// # Errors
///
/// Returns an error if the connection cannot be established within
/// `retry_for` or breaks mid-exchange.
pub async fn send_request(
    addr: SocketAddr,
    retry_for: Duration,
    request: &str,
    expect_greeting: bool,
) -> anyhow::Result<Option<String>> {
    let mut client = LineClient::connect(addr, retry_for)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    if expect_greeting {
        let greeting = client.read_line().await.context("failed to read greeting")?;
        tracing::debug!("greeting from {addr}: {greeting:?}");
    }
    client
        .send_request(request)
        .await
        .with_context(|| format!("request to {addr} failed"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Both ports on ephemeral loopback ports.
    fn loopback_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.bind_address = "127.0.0.1".to_string();
        config.command_port.port = 0;
        config
    }

    /// Finds a free loopback port for the debug port (whose 0 means "off").
    async fn free_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_debug_port_disabled_by_default() {
        let ports = ControlPorts::start(&Handle::current(), &loopback_config()).unwrap();
        assert!(ports.debug_addr().is_none());
        ports.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_both_ports_answer_ping() {
        // Arrange
        let mut config = loopback_config();
        config.debug_port.port = free_port().await;
        let ports = ControlPorts::start(&Handle::current(), &config).unwrap();
        let debug_addr = ports.debug_addr().expect("debug port enabled");

        // Act
        let command_reply =
            send_request(ports.command_addr(), Duration::from_secs(2), "ping", false)
                .await
                .unwrap();
        let debug_reply = send_request(debug_addr, Duration::from_secs(2), "ping", false)
            .await
            .unwrap();
        let debug_unknown = send_request(debug_addr, Duration::from_secs(2), "status", false)
            .await
            .unwrap();

        // Assert
        assert_eq!(command_reply.as_deref(), Some("pong"));
        assert_eq!(debug_reply.as_deref(), Some("pong"));
        assert_eq!(
            debug_unknown.as_deref(),
            Some("ERROR: unknown request 'status'")
        );
        ports.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_command_port_closes_on_unknown_request() {
        let ports = ControlPorts::start(&Handle::current(), &loopback_config()).unwrap();

        let reply = send_request(ports.command_addr(), Duration::from_secs(2), "reboot", false)
            .await
            .unwrap();

        assert!(reply.is_none());
        ports.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_skips_greeting() {
        let mut config = loopback_config();
        config.command_port.greeting = "{\"cameras\":[]}".to_string();
        let ports = ControlPorts::start(&Handle::current(), &config).unwrap();

        let reply = send_request(ports.command_addr(), Duration::from_secs(2), "clients", true)
            .await
            .unwrap();

        assert_eq!(reply.as_deref(), Some("1"));
        ports.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_bind_address_is_reported() {
        let mut config = loopback_config();
        config.bind_address = "not-an-ip".to_string();

        let err = ControlPorts::start(&Handle::current(), &config)
            .err()
            .expect("start must fail");

        assert!(format!("{err:#}").contains("invalid bind address"));
    }

    #[tokio::test]
    async fn test_occupied_command_port_is_reported() {
        let first = ControlPorts::start(&Handle::current(), &loopback_config()).unwrap();
        let mut config = loopback_config();
        config.command_port.port = first.command_addr().port();

        let err = ControlPorts::start(&Handle::current(), &config)
            .err()
            .expect("second start must fail");

        assert!(format!("{err:#}").contains("failed to start command port"));
        first.stop().await.unwrap();
    }
}
