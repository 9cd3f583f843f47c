//! # Audio Node Client Host
//!
//! Minimal host process around the library: connects to every configured
//! node, logs every notification, and reports node health periodically.
//!
//! ## Startup Sequence:
//! 1. Load `.env` and initialize logging
//! 2. Load and validate configuration
//! 3. Build the notification sink and the node registry
//! 4. Signal readiness and connect every node
//! 5. Run until SIGINT/SIGTERM, then shut every node down

use anyhow::Result;    // Startup errors bubble up to main
use audio_node_client::health::health_report;
use audio_node_client::{
    AppConfig, BroadcastSink, EventSink, NodeRegistry, Notification, Readiness, WsConnector,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};  // SIGINT/SIGTERM handling
use tokio::sync::broadcast;  // Fan-out of notifications to the log listener
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting audio-node-client v{}", env!("CARGO_PKG_VERSION"));
    info!(
        nodes = config.nodes.len(),
        user_id = config.client.user_id,
        "Configuration loaded"
    );

    let sink = Arc::new(BroadcastSink::new(256));
    let listener = tokio::spawn(log_notifications(sink.subscribe()));

    let readiness = Readiness::new();
    let registry = Arc::new(
        NodeRegistry::from_config(
            &config,
            Arc::new(WsConnector::new()),
            Arc::clone(&sink) as Arc<dyn EventSink>,
            readiness.clone(),
        )
        .await?,
    );

    // Nothing else to initialize in this host
    readiness.mark_ready();

    let connected = registry.connect_all().await;
    info!(connected, total = config.nodes.len(), "Initial connect finished");

    let reporter = (config.client.report_interval_secs > 0).then(|| {
        tokio::spawn(report_health(
            Arc::clone(&registry),
            Duration::from_secs(config.client.report_interval_secs),
        ))
    });

    wait_for_shutdown().await?;

    info!("Shutdown signal received, disconnecting nodes...");
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    registry.shutdown_all().await;
    listener.abort();

    info!("Stopped gracefully");
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_node_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

async fn log_notifications(mut rx: broadcast::Receiver<Notification>) {
    loop {
        match rx.recv().await {
            Ok(Notification::NodeReady { node }) => {
                info!(node = %node.identifier(), "Node ready")
            }
            Ok(Notification::NodeConnectionClosed { node }) => {
                warn!(node = %node.identifier(), "Node connection closed for good")
            }
            Ok(notification @ Notification::Event { .. }) => {
                debug!(notification = ?notification, "Session event")
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notification listener lagged")
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn report_health(registry: Arc<NodeRegistry>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let report = health_report(&registry).await;
        info!(status = %report["status"], report = %report, "Health report");
    }
}

async fn wait_for_shutdown() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}
