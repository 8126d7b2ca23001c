//! floor-twin - real-time retail floor digital twin
//!
//! Simulates a physical retail floor (zones, sensors, stock, security
//! motion, virtual customers, spatial layout) and broadcasts structured
//! updates to every connected client over a JSON-frame socket.
//!
//! Module structure:
//! - `domain/` - Core simulation types (zones, events, commands)
//! - `io/` - External interfaces (frame listener, event channel, metrics endpoint)
//! - `services/` - Simulation logic (world, domains, engine)
//! - `infra/` - Infrastructure (config, metrics)

use clap::Parser;
use floor_twin::domain::types::epoch_ms;
use floor_twin::infra::{Config, Metrics};
use floor_twin::io::create_event_channel;
use floor_twin::services::{Engine, World};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// floor-twin - retail floor simulation and broadcast server
#[derive(Parser, Debug)]
#[command(name = "floor-twin", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("floor-twin starting");

    // Parse command line arguments using clap
    let args = Args::parse();

    // Load configuration from TOML file
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        listen_addr = %config.listen_addr(),
        zones = %config.zones().len(),
        patterns = %config.patterns().len(),
        update_interval_ms = %config.update_interval_ms(),
        customer_interval_ms = %config.customer_interval_ms(),
        prediction_interval_ms = %config.prediction_interval_ms(),
        layout_interval_ms = %config.layout_interval_ms(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());

    // Session channel: connection tasks -> engine (bounded for backpressure)
    let (session_tx, session_rx) = mpsc::channel(1024);

    // Start the frame listener
    let listener_addr = config.listen_addr();
    let listener_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            floor_twin::io::start_listener(listener_addr, session_tx, listener_shutdown).await
        {
            tracing::error!(error = %e, "listener error");
        }
    });

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = floor_twin::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "metrics server error");
            }
        });
    }

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Build the world and the engine that owns it
    let (event_tx, event_rx) = create_event_channel(1024);
    let world = World::new(&config, event_tx, epoch_ms());
    let mut engine = Engine::new(config, world, event_rx, metrics);
    info!("engine_ready");

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run engine - consumes session messages and ticks until shutdown
    engine.run(session_rx, shutdown_rx).await;

    info!("floor-twin shutdown complete");
    Ok(())
}
