//! Verdant Publisher - Edge telemetry publisher for grow-node fleets
//!
//! Runs on each edge node and ships sensor readings to InfluxDB:
//! - Polls a drop directory for sensor reading files (~1s cycle)
//! - Accepts pushed readings over HTTP (POST /node/update)
//! - Deduplicates unchanged values per sensor/field series
//! - Writes every changed value to the tenant bucket and the shared data lake
//! - Enriches node status with Docker container state and workload health probes

mod collector;
mod config;
mod dedup;
mod docker;
mod enrich;
mod error;
mod health;
mod http;
mod influx;
mod point;
mod reading;
mod sink;
mod source;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::collector::Collector;
use crate::config::Config;
use crate::docker::{DockerClient, RuntimeInventory};
use crate::enrich::{ContainerEnricher, HttpHealthProbe};
use crate::health::StatusTracker;
use crate::http::AppState;
use crate::influx::{InfluxClient, InfluxSink};
use crate::point::PointBuilder;
use crate::sink::{PointSink, SinkFanout, SinkRole};
use crate::source::FileSource;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,verdant_publisher=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Verdant Publisher starting...");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Node {} ({} / {}), readings from {}",
        config.node_id,
        config.friendly_name,
        config.customer_id,
        config.readings_dir.display()
    );

    let status = StatusTracker::new(config.node_id.clone());

    // InfluxDB client, shared by both sinks
    let influx = InfluxClient::new(&config.influx_url, &config.influx_org, &config.influx_token)
        .context("Failed to create InfluxDB client")?;
    if let Err(e) = influx.ping().await {
        warn!("{e}; starting degraded, writes will be attempted anyway");
        status.mark_degraded();
    }

    // Container runtime, used for status enrichment only
    let docker = Arc::new(DockerClient::new(&config.docker_socket));
    if let Err(e) = docker.ping().await {
        warn!("{e}; starting degraded, container enrichment will fail until it returns");
        status.mark_degraded();
    }

    let sinks: Vec<Box<dyn PointSink>> = vec![
        Box::new(InfluxSink::new(
            influx.clone(),
            SinkRole::Tenant,
            config.tenant_bucket.clone(),
        )),
        Box::new(InfluxSink::new(
            influx,
            SinkRole::Lake,
            config.lake_bucket.clone(),
        )),
    ];

    let probe = HttpHealthProbe::new(
        config.probe_port,
        config.probe_path.clone(),
        Duration::from_millis(config.probe_timeout_ms),
    )
    .context("Failed to create workload health probe")?;

    let runtime: Arc<dyn RuntimeInventory> = docker;
    let enricher = ContainerEnricher::new(
        runtime,
        Arc::new(probe),
        config.docker_all,
        Duration::from_millis(config.probe_timeout_ms),
        config.probe_concurrency,
    );

    let collector = Arc::new(Collector::new(
        PointBuilder::new(config.identity()),
        SinkFanout::new(sinks),
        enricher,
        Box::new(FileSource::new(&config.readings_dir)),
        status.clone(),
        Duration::from_secs(config.poll_interval_secs),
    ));

    // Poll loop runs until the shutdown flag flips
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_collector = collector.clone();
    let loop_task = tokio::spawn(async move {
        loop_collector.run(shutdown_rx).await;
    });

    let app = http::build_router(AppState { collector, status });

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("HTTP server failed")?;

    // Let the in-flight poll cycle finish before exiting
    let _ = loop_task.await;
    info!("Shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then flips the collector shutdown flag.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }

    let _ = shutdown_tx.send(true);
}
