//! Error types for the server core.
//!
//! Failures are split along the containment boundary the server guarantees:
//! per-session problems are handled where they occur and never surface here,
//! while the variants below represent conditions that end the serving
//! lifetime (startup binding, control channel integrity) or that callers
//! need to distinguish.

use thiserror::Error;

/// Errors that can escape the server core.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Network-level failure (socket provisioning, listener setup)
    #[error("Network error: {0}")]
    Network(String),

    /// The internal control channel was closed or delivered a torn frame
    #[error("Control channel error: {0}")]
    ControlChannel(String),

    /// Internal error (worker pool failure, invalid internal state)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenient result alias used throughout the server crate.
pub type Result<T> = std::result::Result<T, ServerError>;
