//! Configuration module for the Starhold server
//!
//! Handles command-line arguments, configuration file parsing, and default
//! settings.

pub mod args;
pub mod settings;

pub use args::Args;
pub use settings::{Config, LoggingSettings, ServerSettings};

use anyhow::Result;
use tracing::{info, warn};

/// Load configuration from file or create default configuration
///
/// Attempts to load configuration from the file named in `args`. If the
/// file doesn't exist, a default configuration file is written there and
/// the defaults are returned. Command-line overrides (port) are applied to
/// whatever was loaded.
///
/// # Errors
/// * Returns error if file I/O operations fail
/// * Returns error if TOML parsing fails
pub async fn load_config(args: &Args) -> Result<Config> {
    let mut config = if args.config.exists() {
        let config_str = tokio::fs::read_to_string(&args.config).await?;
        match toml::de::from_str::<Config>(&config_str) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to parse config file {}: {}", args.config.display(), e);
                return Err(e.into());
            }
        }
    } else {
        warn!(
            "Configuration file not found: {}, using defaults",
            args.config.display()
        );

        let default_config = Config::default();
        let config_str = toml::to_string_pretty(&default_config)?;
        tokio::fs::write(&args.config, config_str).await?;
        info!("Created default configuration file: {}", args.config.display());

        default_config
    };

    if let Some(port) = args.port {
        config.server.listen_port = port;
    }
    if args.json_logs {
        let logging = config.logging.get_or_insert(LoggingSettings {
            level: "info".to_string(),
            json_format: true,
        });
        logging.json_format = true;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_config_default() {
        let temp_file = NamedTempFile::new().unwrap();
        let args = Args {
            config: temp_file.path().to_path_buf(),
            ..Default::default()
        };

        // Delete the file to test default creation
        drop(temp_file);

        let config = load_config(&args).await.unwrap();
        assert_eq!(config.server.listen_port, 2049);
        assert!(args.config.exists());

        std::fs::remove_file(&args.config).ok();
    }

    #[tokio::test]
    async fn test_load_config_existing() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
[server]
listen_port = 3333
listen_backlog = 64
max_line_length = 4096
motd = "test server"

[logging]
level = "info"
json_format = false
        "#;

        temp_file.write_all(config_content.as_bytes()).unwrap();

        let args = Args {
            config: temp_file.path().to_path_buf(),
            ..Default::default()
        };

        let config = load_config(&args).await.unwrap();
        assert_eq!(config.server.listen_port, 3333);
        assert_eq!(config.server.listen_backlog, 64);
    }

    #[tokio::test]
    async fn test_load_config_port_override() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
[server]
listen_port = 3333
listen_backlog = 64
max_line_length = 4096
motd = "test server"
        "#;

        temp_file.write_all(config_content.as_bytes()).unwrap();

        let args = Args {
            config: temp_file.path().to_path_buf(),
            port: Some(4444),
            ..Default::default()
        };

        let config = load_config(&args).await.unwrap();
        assert_eq!(config.server.listen_port, 4444);
    }

    #[tokio::test]
    async fn test_load_config_rejects_bad_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not valid toml [[[").unwrap();

        let args = Args {
            config: temp_file.path().to_path_buf(),
            ..Default::default()
        };

        assert!(load_config(&args).await.is_err());
    }
}
