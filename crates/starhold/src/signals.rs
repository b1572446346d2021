//! Graceful shutdown signal handling.

use tracing::{error, info};

/// Resolve when a shutdown signal arrives.
///
/// If the handlers cannot be installed the error is logged and this
/// parks forever; the console quit path still works in that case.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {
                        info!("📡 Received SIGINT");
                    }
                    _ = sigterm.recv() => {
                        info!("📡 Received SIGTERM");
                    }
                }
            }
            (sigint, sigterm) => {
                for e in [sigint.err(), sigterm.err()].into_iter().flatten() {
                    error!("Failed to install signal handler: {}", e);
                }
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(windows)]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("📡 Received Ctrl+C"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
