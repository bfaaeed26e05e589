//! control-port library crate.
//!
//! The remote-control server exposes two line-based TCP ports, both built on
//! `control-core`:
//!
//! - the **command port**, which serves one operator client at a time and
//!   optionally greets it on connect;
//! - the **debug port**, an always-on `ping`/`pong` liveness probe.
//!
//! # Architecture
//!
//! ```text
//! nc / control-port send   (newline-delimited text over TCP)
//!         ↕
//! [control-port]
//!   ├── domain/           AppConfig (TOML schema + defaults)
//!   ├── application/      DebugPortHandler, CommandPortHandler
//!   └── infrastructure/
//!         ├── storage/    Load AppConfig from disk
//!         └── ports/      Start/stop both LineServers; one-shot `send`
//! ```
//!
//! The binary (`main.rs`) only parses arguments, sets up logging and waits for
//! Ctrl+C; everything it calls lives here so it can be tested.

/// Domain layer: configuration schema.
pub mod domain;

/// Application layer: request handlers for the two ports.
pub mod application;

/// Infrastructure layer: config file access and server lifecycle.
pub mod infrastructure;
