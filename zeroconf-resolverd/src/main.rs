mod api;
mod config;
mod error;
mod mdns;
mod platform;
mod resolution;
mod resolution_manager;

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::mdns::browser::MdnsFacility;
use crate::resolution::{hash, Coordinator};
use crate::resolution_manager::CoordinatorHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("zeroconf_resolverd=info"))
        )
        .init();

    tracing::info!("Starting zeroconf-resolverd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/zeroconf-resolver/resolverd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Create mDNS daemon, optionally bound to one interface
    let mdns_daemon = ServiceDaemon::new()
        .context("Failed to create mDNS daemon")?;
    if let Some(interface) = &config.scan.interface {
        mdns_daemon
            .disable_interface(mdns_sd::IfKind::All)
            .context("Failed to disable default interfaces")?;
        mdns_daemon
            .enable_interface(interface.as_str())
            .with_context(|| format!("Failed to enable interface {}", interface))?;
    }

    let (event_tx, event_rx) = mpsc::channel(256);
    let facility = Arc::new(MdnsFacility::new(
        mdns_daemon.clone(),
        event_tx,
        config.resolve_timeout(),
    ));

    let (notify_tx, _) = broadcast::channel(256);
    let (hash_tx, hash_rx) = watch::channel(hash::compute_hash(&[]));

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let coordinator = Coordinator::new(facility, notify_tx.clone(), config.policy());
    let (handle, coordinator_task) =
        CoordinatorHandle::spawn(coordinator, config.schedule(), hash_tx, cancel.clone());

    handle
        .subscribe(event_rx)
        .await
        .context("Failed to attach platform events")?;
    handle
        .scan(config.scan.request.clone())
        .await
        .context("Failed to start scan")?;

    // Log notifications for operators
    let mut log_rx = notify_tx.subscribe();
    let log_cancel = cancel.clone();
    let log_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                notification = log_rx.recv() => match notification {
                    Ok(notification) => tracing::debug!(?notification, "Notification"),
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = log_cancel.cancelled() => break,
            }
        }
    });

    // Restart the scan when a resolution wedges
    let supervisor_handle = if config.watchdog.restart_on_stall {
        Some(tokio::spawn(resolution_manager::supervise_stalls(
            handle.clone(),
            notify_tx.subscribe(),
            cancel.clone(),
        )))
    } else {
        None
    };

    // Build API router
    let app_state = api::routes::AppState {
        coordinator: handle.clone(),
        hash_rx,
        notifications: notify_tx.clone(),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    if let Err(e) = handle.stop_scan().await {
        tracing::error!("Failed to stop scan: {}", e);
    }
    if let Err(e) = handle.shutdown().await {
        tracing::error!("Failed to shutdown coordinator: {}", e);
    }

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let _ = tokio::join!(coordinator_task, log_handle, server_handle);
    if let Some(supervisor) = supervisor_handle {
        let _ = supervisor.await;
    }

    // Shutdown mDNS daemon
    if let Err(e) = mdns_daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
