//! Loading `AppConfig` from a TOML file.
//!
//! A missing file is not an error: the control ports run with defaults until
//! an operator writes a config.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::config::AppConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error other than "not found".
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no config at {}; using defaults", path.display());
            Ok(AppConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// A unique scratch path under the system temp dir.
    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "control-port-{}-{}-{name}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ))
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg = load_config(&scratch("absent.toml")).expect("defaults");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_file_values_are_loaded() {
        // Arrange
        let path = scratch("ports.toml");
        std::fs::write(
            &path,
            "log_level = \"debug\"\n[command_port]\nport = 21000\nmax_clients = 2\n",
        )
        .unwrap();

        // Act
        let cfg = load_config(&path).expect("load");
        std::fs::remove_file(&path).ok();

        // Assert
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.command_port.port, 21000);
        assert_eq!(cfg.command_port.max_clients, 2);
        assert_eq!(cfg.command_port.idle_timeout_secs, 60);
    }

    #[test]
    fn test_malformed_file_reports_parse_error_with_path() {
        let path = scratch("broken.toml");
        std::fs::write(&path, "[command_port\nport = ").unwrap();

        let err = load_config(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_directory_path_reports_io_error() {
        let err = load_config(&std::env::temp_dir()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
