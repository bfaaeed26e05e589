//! # control-core
//!
//! A small line-based TCP server used for the remote-control command and debug
//! ports.  It accepts connections, splits the incoming byte stream into
//! newline-terminated requests, hands each request to a caller-supplied
//! handler, writes the handler's response back, and closes any connection that
//! stays idle longer than the configured timeout.
//!
//! The protocol is deliberately human-typable: you can talk to a running
//! server with `telnet` or `nc` and type `ping`.
//!
//! # Architecture
//!
//! ```text
//! [control-core]
//!   ├── domain/           Pure types: ServerConfig, ConnectionId, LineFramer
//!   ├── application/      Handler contract (ConnectionHandler) and admission registry
//!   └── infrastructure/
//!         ├── listener/   Bind + accept loop, one Session per connection
//!         ├── session/    Request loop raced against the watchdog
//!         ├── watchdog/   Rolling idle deadline
//!         └── client/     Line client used by operators and tests
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` only.
//! - `infrastructure` depends on all other layers plus `tokio`.

pub mod domain;

pub mod application;

pub mod infrastructure;

// Re-export the types an embedding application needs so it can write
// `control_core::LineServer` instead of the full module path.
pub use application::handler::{Admission, CallbackHandler, ConnectionHandler, HandlerError};
pub use application::registry::{ClientLimit, ConnectionRegistry, RegistryError};
pub use domain::config::{ConfigError, ServerConfig};
pub use domain::identity::ConnectionId;
pub use infrastructure::client::{ClientError, LineClient};
pub use infrastructure::listener::{LineServer, ServerError, ServerHandle};
pub use infrastructure::session::{Session, SessionEnd, SessionError};
