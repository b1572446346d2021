//! Command-line argument parsing
//!
//! Defines the command-line interface for the Starhold server using the
//! clap crate. Arguments override the corresponding configuration file
//! settings.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Starhold server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// Specifies the path to the TOML configuration file.
    /// If the file doesn't exist, a default configuration will be created.
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Listen port
    ///
    /// Override the TCP listen port from the configuration file.
    /// The server binds the port on every usable address family.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Enable debug logging
    ///
    /// When enabled, sets the logging level to debug, providing more
    /// detailed output for troubleshooting.
    #[arg(short, long)]
    pub debug: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("config.toml"),
            port: None,
            debug: false,
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::default();
        assert_eq!(args.config, PathBuf::from("config.toml"));
        assert!(args.port.is_none());
        assert!(!args.debug);
        assert!(!args.json_logs);
    }
}
