//! Logging system setup and configuration
//!
//! Handles the initialization of the tracing-based logging system used
//! throughout the server for debugging, monitoring, and diagnostic output.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Args, LoggingSettings};

/// Initialize the logging system
///
/// Sets up structured logging using the tracing crate with configurable
/// output format and filtering levels. The `--debug` flag takes precedence
/// over the configured level, and the `RUST_LOG` environment variable takes
/// precedence over both.
///
/// # Arguments
/// * `args` - Command line arguments containing the debug flag
/// * `settings` - Optional logging section from the configuration file
///
/// # Environment Variables
/// * `RUST_LOG` - Override the logging filter (e.g., "debug", "my_crate=trace")
pub fn setup_logging(args: &Args, settings: Option<&LoggingSettings>) -> Result<()> {
    let level = if args.debug {
        "debug"
    } else {
        settings.map(|s| s.level.as_str()).unwrap_or("info")
    };

    // Respect RUST_LOG, falling back to the resolved level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let json_format = settings.map(|s| s.json_format).unwrap_or(false);

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()?;
    }

    Ok(())
}
