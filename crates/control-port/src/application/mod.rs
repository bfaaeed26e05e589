//! Application layer for control-port.
//!
//! The two `ConnectionHandler` implementations that give each port its
//! behaviour.  They never touch sockets; `control-core` does the I/O.

pub mod handlers;

pub use handlers::{command_port_handler, CommandPortHandler, DebugPortHandler};
