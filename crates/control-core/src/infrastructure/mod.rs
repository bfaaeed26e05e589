//! Infrastructure layer for control-core.
//!
//! Everything that touches sockets or timers lives here.
//!
//! # Modules
//!
//! - [`listener`]: binds the port, runs the accept loop, spawns one session
//!   per connection and owns the shutdown signal.
//! - [`session`]: one connection's lifecycle, including the request loop and
//!   its race against the idle watchdog.
//! - [`watchdog`]: the rolling idle deadline.
//! - [`client`]: a minimal line client for operators and integration tests.

pub mod client;
pub mod listener;
pub mod session;
pub mod watchdog;
