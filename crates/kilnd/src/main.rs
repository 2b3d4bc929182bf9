//! Kiln bridge daemon - serial link, session history, live status fan-out.
//!
//! # Usage
//!
//! ```bash
//! # Start against the default port (/dev/ttyACM0)
//! kilnd
//!
//! # Custom port and history location
//! kilnd --port /dev/ttyUSB0 --db /var/lib/kilnd/history.json
//!
//! # Environment overrides
//! KILN_SERIAL_PORT=/dev/ttyUSB0 RUST_LOG=kilnd=debug kilnd
//! ```
//!
//! # Signal Handling
//!
//! SIGTERM/SIGINT: sends a `stop` command to the kiln (never leave the
//! heater running unattended), then shuts down gracefully.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kilnd::broadcaster::StatusBroadcaster;
use kilnd::config;
use kilnd::coordinator::SessionCoordinator;
use kilnd::link::HardwareLink;
use kilnd::repository::SessionRepository;
use kilnd::store::DocumentStore;

/// Kiln bridge daemon
#[derive(Parser, Debug)]
#[command(name = "kilnd", version, about)]
struct Args {
    /// Serial port the kiln controller is attached to
    #[arg(long, env = "KILN_SERIAL_PORT", default_value = config::DEFAULT_SERIAL_PORT)]
    port: String,

    /// Serial baud rate
    #[arg(long, env = "KILN_BAUD_RATE", default_value_t = config::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Path of the firing history document
    #[arg(long, env = "KILN_DB_PATH")]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("kilnd=info".parse()?)
                .add_directive("kiln_core=info".parse()?)
                .add_directive("kiln_protocol=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let history_path = args.db.unwrap_or_else(config::default_history_path);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = %args.port,
        baud = args.baud,
        db = %history_path.display(),
        "Kiln bridge starting"
    );

    if let Some(parent) = history_path.parent() {
        fs::create_dir_all(parent).context("Failed to create history directory")?;
    }

    // Load the firing history; a malformed file fails startup rather than
    // silently resetting recorded firings
    let store = DocumentStore::open(&history_path);
    let repository = Arc::new(
        SessionRepository::load(store)
            .await
            .context("Failed to load firing history")?,
    );
    let broadcaster = StatusBroadcaster::new();

    // Serial open failure is fatal: the bridge is useless without its kiln
    let (link, messages) = match HardwareLink::connect(&args.port, args.baud).await {
        Ok(connected) => connected,
        Err(e) => {
            error!(error = %e, "Failed to connect to kiln");
            error!(
                port = %args.port,
                "Check that the controller is plugged in and --port is correct"
            );
            process::exit(1);
        }
    };

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    // Spawn the coordinator: the single consumer of hardware messages
    let coordinator = SessionCoordinator::new(Arc::clone(&repository), Arc::clone(&broadcaster));
    let coordinator_task = tokio::spawn(coordinator.run(messages, cancel_token.clone()));

    info!("Kiln bridge running");

    cancel_token.cancelled().await;

    // Never leave the heater running once nobody is watching it
    info!("Stopping kiln before exit");
    link.stop().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    if let Err(e) = coordinator_task.await {
        error!(error = %e, "Coordinator task failed");
    }

    info!("Kiln bridge stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
