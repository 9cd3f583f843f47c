//! # Health Report
//!
//! A JSON summary of every node the registry knows about: connection state,
//! last failure, latest statistics, load penalty and frame counters. The host
//! binary logs it periodically; embedders can serve it however they like.

use crate::registry::NodeRegistry;
use serde_json::{json, Value};

pub async fn health_report(registry: &NodeRegistry) -> Value {
    let mut nodes = Vec::new();
    let mut available = 0;

    for client in registry.clients().await {
        let node = client.node();
        if node.is_available() {
            available += 1;
        }

        let stats = node.stats().await;
        let metrics = node.metrics().snapshot();
        nodes.push(json!({
            "identifier": node.identifier(),
            "uri": node.uri(),
            "region": node.region(),
            "available": node.is_available(),
            "connected": client.is_connected(),
            "auto_reconnect": client.auto_reconnect(),
            "last_error": client.last_error().await,
            "sessions": node.sessions().len().await,
            "penalty": node.penalty().await,
            "stats": stats.map(|s| json!({
                "players": s.players,
                "playing_players": s.playing_players,
                "uptime_ms": s.uptime,
                "system_load": s.cpu.system_load,
                "received_at": s.received_at.to_rfc3339(),
            })),
            "metrics": {
                "frames_received": metrics.frames_received,
                "decode_failures": metrics.decode_failures,
                "dropped_unknown_session": metrics.dropped_unknown_session,
                "unknown_events": metrics.unknown_events,
                "subscriber_failures": metrics.subscriber_failures,
                "connect_attempts": metrics.connect_attempts,
                "reconnect_attempts": metrics.reconnect_attempts,
                "drop_rate": metrics.drop_rate(),
            },
        }));
    }

    let status = match (available, nodes.len()) {
        (_, 0) => "empty",
        (0, _) => "unavailable",
        (a, n) if a < n => "degraded",
        _ => "healthy",
    };

    json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": registry.uptime_seconds(),
        "ready": registry.readiness().is_ready(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "nodes": nodes,
    })
}
