//! Request handlers for the debug and command ports.
//!
//! # Debug port
//!
//! | Request  | Response                              |
//! |----------|---------------------------------------|
//! | `ping`   | `pong`                                |
//! | other    | `ERROR: unknown request '<request>'`  |
//!
//! # Command port
//!
//! | Request   | Response                                     |
//! |-----------|----------------------------------------------|
//! | *(empty)* | nothing                                      |
//! | `ping`    | `pong`                                       |
//! | `whoami`  | the client's `address:port`                  |
//! | `clients` | number of admitted command-port clients      |
//! | other     | connection closed (`Unknown request type`)   |
//!
//! The command port only admits `max_clients` clients at a time; see
//! [`command_port_handler`].

use std::sync::Arc;

use control_core::{
    Admission, ClientLimit, ConnectionHandler, ConnectionId, ConnectionRegistry, HandlerError,
};
use tracing::info;

use crate::domain::config::CommandPortConfig;

/// Liveness probe: answers `ping` and reports anything else as an error line.
#[derive(Debug, Default)]
pub struct DebugPortHandler;

impl ConnectionHandler for DebugPortHandler {
    fn connection_made(&self, id: &ConnectionId) -> Admission {
        info!("debug port: client {id} connected");
        Admission::Accept
    }

    fn connection_lost(&self, id: &ConnectionId) {
        info!("debug port: client {id} disconnected");
    }

    fn request_received(&self, _id: &ConnectionId, request: &str) -> Result<String, HandlerError> {
        Ok(match request {
            "ping" => "pong".to_string(),
            other => format!("ERROR: unknown request '{other}'"),
        })
    }
}

/// Operator command handler.
///
/// Shares the admission registry with the [`ClientLimit`] that wraps it so
/// that `clients` reports the live count.
#[derive(Debug)]
pub struct CommandPortHandler {
    greeting: String,
    registry: Arc<ConnectionRegistry>,
}

impl CommandPortHandler {
    pub fn new(greeting: impl Into<String>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            greeting: greeting.into(),
            registry,
        }
    }
}

impl ConnectionHandler for CommandPortHandler {
    fn connection_made(&self, id: &ConnectionId) -> Admission {
        info!("command port: client {id} connected");
        Admission::greeting(self.greeting.clone())
    }

    fn connection_lost(&self, id: &ConnectionId) {
        info!("command port: client {id} disconnected");
    }

    fn request_received(&self, id: &ConnectionId, request: &str) -> Result<String, HandlerError> {
        match request {
            "" => Ok(String::new()),
            "ping" => Ok("pong".to_string()),
            "whoami" => Ok(id.peer().to_string()),
            "clients" => Ok(self.registry.len().to_string()),
            other => Err(HandlerError::Rejected(format!(
                "Unknown request type: '{other}'"
            ))),
        }
    }
}

/// Builds the command-port handler wrapped in its admission limit.
pub fn command_port_handler(config: &CommandPortConfig) -> ClientLimit<CommandPortHandler> {
    let registry = Arc::new(ConnectionRegistry::new(config.client_limit()));
    let handler = CommandPortHandler::new(config.greeting.clone(), Arc::clone(&registry));
    ClientLimit::with_registry(handler, registry)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
