//! Domain layer for control-port.

pub mod config;

pub use config::{AppConfig, CommandPortConfig, DebugPortConfig};
