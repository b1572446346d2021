//! Main application entry point for the Starhold server
//!
//! Wires the network core to the game command interpreter, then runs the
//! administrative console and signal handlers alongside the reactor.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use starhold_server::config::{self, Args};
use starhold_server::{control_channel, logging, GameServer, SessionRegistry};

mod commands;
mod console;
mod signals;

use commands::GameCommands;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first, then bring logging up with its settings
    let config = config::load_config(&args)
        .await
        .context("Failed to load configuration")?;
    logging::setup_logging(&args, config.logging.as_ref())
        .context("Failed to initialize logging")?;

    display_banner();
    info!("🚀 Starting Starhold server");
    info!("📋 Configuration Summary:");
    info!("  🌐 Listen port: {}", config.server.listen_port);
    info!("  📥 Listen backlog: {}", config.server.listen_backlog);
    info!("  📏 Max line length: {} bytes", config.server.max_line_length);
    info!("  📂 Config: {}", args.config.display());

    let (control, control_receiver) = control_channel();
    let registry = Arc::new(SessionRegistry::new());
    let handler = Arc::new(GameCommands::new(Arc::clone(&registry)));

    let server = GameServer::bind(
        config.server.clone(),
        Arc::clone(&registry),
        handler,
        control_receiver,
    )
    .context("Failed to start server")?;

    for addr in server.local_addrs() {
        info!("🌐 Waiting for connections on {}", addr);
    }
    info!("🛑 Press Ctrl+C or type 'quit' at the console to shut down");

    let server_task = tokio::spawn(server.serve());

    // The console owns stdin until the operator quits; signals cover
    // Ctrl+C and SIGTERM. Either path terminates through the control
    // channel so the reactor drains sessions the same way.
    tokio::select! {
        _ = console::run(control.clone(), Arc::clone(&registry)) => {}
        _ = signals::wait_for_shutdown() => {
            info!("🛑 Shutdown signal received, initiating graceful shutdown...");
            if let Err(e) = control.terminate().await {
                error!("Failed to send terminate: {}", e);
            }
        }
    }

    match server_task.await {
        Ok(Ok(())) => {
            info!("👋 Starhold server shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("❌ Server error: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("❌ Server task failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Display startup banner using proper logging
fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║            🌟 STARHOLD SERVER 🌟         ║");
    info!("║                 v{}                   ║", version);
    info!("║                                          ║");
    info!("║  Persistent Multi-User Game Server       ║");
    info!("║                                          ║");
    info!("║  📡 Single-Task Socket Reactor           ║");
    info!("║  🌐 IPv4 + IPv6 Listeners                ║");
    info!("║  ⚔️  Serialized Command Dispatch          ║");
    info!("║  🖥️  Administrative Console               ║");
    info!("║                                          ║");
    info!("╚══════════════════════════════════════════╝");
}
