//! Infrastructure layer for control-port.

pub mod ports;
pub mod storage;

pub use ports::{send_request, ControlPorts};
pub use storage::{load_config, ConfigError};
