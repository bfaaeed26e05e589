//! Domain layer for control-core.
//!
//! Pure types with no dependencies on sockets, timers or the async runtime,
//! so they can be tested in isolation.
//!
//! # What belongs here?
//!
//! - Server configuration
//! - Connection identity
//! - Line framing and response normalisation
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream` or timer types
//! - Logging of connection events

pub mod config;
pub mod framer;
pub mod identity;

pub use config::{ConfigError, ServerConfig};
pub use framer::{encode_response, LineFramer};
pub use identity::ConnectionId;
