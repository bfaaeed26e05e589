//! Configuration schema for the control ports.
//!
//! Stored as TOML.  Every field has a serde default, so an empty file, a
//! partial file, or no file at all all produce a working configuration:
//!
//! ```toml
//! log_level = "info"
//! bind_address = "0.0.0.0"
//!
//! [debug_port]
//! port = 0                 # 0 disables the debug port
//! idle_timeout_secs = 60
//!
//! [command_port]
//! port = 20000
//! idle_timeout_secs = 60
//! max_clients = 1          # 0 means unlimited
//! greeting = ""            # sent to each admitted client when non-empty
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// IP address both ports bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub debug_port: DebugPortConfig,
    #[serde(default)]
    pub command_port: CommandPortConfig,
}

/// The `ping`/`pong` liveness port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebugPortConfig {
    /// TCP port; 0 disables the debug port.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

/// The operator command port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandPortConfig {
    #[serde(default = "default_command_port")]
    pub port: u16,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Concurrent clients admitted; further clients are told so and
    /// disconnected.  0 means unlimited.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Sent to each admitted client on connect when non-empty.
    #[serde(default)]
    pub greeting: String,
}

impl DebugPortConfig {
    /// Whether the debug port should be started.
    pub fn enabled(&self) -> bool {
        self.port != 0
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl CommandPortConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// The admission limit, `None` when unlimited.
    pub fn client_limit(&self) -> Option<usize> {
        (self.max_clients != 0).then_some(self.max_clients)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_command_port() -> u16 {
    control_core::domain::config::DEFAULT_PORT
}
fn default_idle_timeout_secs() -> u64 {
    control_core::domain::config::DEFAULT_IDLE_TIMEOUT.as_secs()
}
fn default_max_clients() -> usize {
    1
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            bind_address: default_bind_address(),
            debug_port: DebugPortConfig::default(),
            command_port: CommandPortConfig::default(),
        }
    }
}

impl Default for DebugPortConfig {
    fn default() -> Self {
        Self {
            port: 0,
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Default for CommandPortConfig {
    fn default() -> Self {
        Self {
            port: default_command_port(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_clients: default_max_clients(),
            greeting: String::new(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
