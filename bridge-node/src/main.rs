//! Bridge Node Binary
//!
//! Runs the Liquid → Planetmint relay: HTTP registration endpoint plus the
//! periodic eviction and reconciliation jobs.

use adapters::{ElementsClient, PlanetmintClient};
use anyhow::Context;
use bridge_core::Relay;
use bridge_node::{api, init_tracing, AppState, NodeConfig};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = if let Ok(config_path) = std::env::var("BRIDGE_CONFIG") {
        match NodeConfig::load_or_init(&config_path)? {
            Some(config) => config,
            None => {
                println!(
                    "default config file created at {}. please adapt it and restart the application. exiting...",
                    config_path
                );
                return Ok(());
            }
        }
    } else {
        NodeConfig::from_env()?
    };

    init_tracing(&config.log_level);
    info!("Starting bridge node");

    // Ledger clients
    let elements = Arc::new(ElementsClient::new(config.elements.clone())?);
    let planetmint = Arc::new(PlanetmintClient::new(config.planetmint.clone())?);
    info!(wallet = %elements.url(), "Elements client ready");

    // Relay core
    info!(data_dir = ?config.relay.data_dir, "Opening conversion store");
    let relay = Arc::new(
        Relay::open(config.relay.clone(), elements.clone(), planetmint.clone())
            .context("failed to open relay")?,
    );

    let cancel = CancellationToken::new();
    let scheduler = relay.start(cancel.clone());

    // HTTP surface
    let app = api::router(AppState {
        relay: relay.clone(),
        addresses: elements,
        machines: planetmint,
    });

    let listen_addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    info!("Listening on: {}", listen_addr);
    info!("   GET  /receiveaddress/:beneficiary - Issue receiving address");
    info!("   GET  /health - Health check");
    info!("   GET  /metrics - Prometheus metrics");

    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    info!("Shutting down bridge node...");
    cancel.cancel();
    scheduler.shutdown().await;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
    }

    info!("Bridge node stopped");
    Ok(())
}
