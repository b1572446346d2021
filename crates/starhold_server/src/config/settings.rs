//! Configuration settings structures
//!
//! Defines the configuration structures used by the server: network
//! settings, wire protocol limits, and logging options. All of them can be
//! serialized to/from TOML format for configuration files.

use serde::{Deserialize, Serialize};

use crate::connection::session::RECV_BUFFER_INITIAL;

/// Main configuration structure
///
/// This is the root configuration object loaded from `config.toml`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Server-specific settings
    pub server: ServerSettings,
    /// Optional logging configuration
    pub logging: Option<LoggingSettings>,
}

/// Server configuration settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerSettings {
    /// TCP port to listen on
    ///
    /// The server resolves every usable local address family (IPv4 and
    /// IPv6) and opens one listening socket per family on this port.
    /// Port 0 asks the OS for an ephemeral port.
    pub listen_port: u16,

    /// Pending-connection backlog for each listening socket
    pub listen_backlog: u32,

    /// Maximum accepted command line length in bytes
    ///
    /// A client line that reaches this length without a terminator is a
    /// protocol violation and closes the connection.
    pub max_line_length: usize,

    /// Greeting sent to every client on connect
    pub motd: String,
}

/// Logging system configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoggingSettings {
    /// Logging level filter
    ///
    /// Valid values: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Enable JSON-formatted log output
    ///
    /// When true, logs are output in structured JSON format,
    /// useful for log aggregation systems.
    pub json_format: bool,
}

impl Default for Config {
    /// Create a default configuration suitable for development
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            }),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_port: 2049,
            listen_backlog: 128,
            max_line_length: 8192,
            motd: format!("Welcome to Starhold v{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ServerSettings {
    /// Validate the settings before the server starts.
    ///
    /// Returns a description of the first problem found, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_backlog == 0 {
            return Err("listen_backlog must be at least 1".to_string());
        }
        if self.max_line_length < RECV_BUFFER_INITIAL {
            return Err(format!(
                "max_line_length must be at least {} bytes",
                RECV_BUFFER_INITIAL
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.listen_port, 2049);
        assert_eq!(config.server.listen_backlog, 128);
        assert_eq!(config.server.max_line_length, 8192);
        assert!(!config.server.motd.is_empty());
        assert!(config.logging.is_some());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.server.listen_port, deserialized.server.listen_port);
        assert_eq!(
            config.server.listen_backlog,
            deserialized.server.listen_backlog
        );
        assert_eq!(
            config.server.max_line_length,
            deserialized.server.max_line_length
        );
        assert_eq!(config.server.motd, deserialized.server.motd);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
[server]
listen_port = 4096
listen_backlog = 16
max_line_length = 1024
motd = "hello"

[logging]
level = "debug"
json_format = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen_port, 4096);
        assert_eq!(config.server.listen_backlog, 16);
        assert_eq!(config.server.max_line_length, 1024);
        assert_eq!(config.server.motd, "hello");
        assert!(config.logging.unwrap().json_format);
    }

    #[test]
    fn test_validate_rejects_tiny_line_limit() {
        let mut settings = ServerSettings::default();
        settings.max_line_length = 16;
        assert!(settings.validate().is_err());

        settings.max_line_length = RECV_BUFFER_INITIAL;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_backlog() {
        let mut settings = ServerSettings::default();
        settings.listen_backlog = 0;
        assert!(settings.validate().is_err());
    }
}
