//! Application layer for control-core.
//!
//! Defines *what* the server asks of the embedding application and the
//! admission policy built on top of it.  No sockets or timers live here.
//!
//! # Responsibilities
//!
//! - The three-callback handler contract (`ConnectionHandler`)
//! - The connection-made verdict (`Admission`) and handler failures (`HandlerError`)
//! - Tracking active connections and limiting how many are admitted

pub mod handler;
pub mod registry;

pub use handler::{Admission, CallbackHandler, ConnectionHandler, HandlerError};
pub use registry::{ClientLimit, ConnectionRegistry, RegistryError};
