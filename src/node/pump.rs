//! Receive loop for one node.
//!
//! Reads frames off the live connection, decodes them and spawns one dispatch
//! task per frame so a slow subscriber never stalls the next read. A closure
//! or a transport error hands control to the reconnect cycle, which either
//! returns a fresh receive half or tells the loop to exit.

use crate::node::client::NodeClient;
use crate::protocol::Frame;
use crate::transport::{FrameSource, Inbound};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(super) async fn run(client: Arc<NodeClient>, initial: Option<Box<dyn FrameSource>>) {
    let node = Arc::clone(client.node());

    let mut source = match initial {
        Some(source) => source,
        None => match client.reconnect().await {
            Some(source) => source,
            None => return,
        },
    };
    debug!(node = %node.identifier(), "Message pump started");

    loop {
        let received = source.recv().await;
        let text = match received {
            Ok(Inbound::Text(text)) => text,
            Ok(Inbound::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(err) => {
                    node.metrics().record_frame();
                    node.metrics().record_decode_failure();
                    warn!(node = %node.identifier(), error = %err, "Dropping non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Inbound::Closed(close)) => {
                match close {
                    Some(info) => info!(
                        node = %node.identifier(),
                        code = info.code,
                        reason = %info.reason,
                        "Node closed the connection"
                    ),
                    None => info!(node = %node.identifier(), "Connection ended without close frame"),
                }
                // Release the dead read half before sleeping through the backoff
                drop(source);
                match client.reconnect().await {
                    Some(next) => {
                        source = next;
                        continue;
                    }
                    None => break,
                }
            }
            Err(err) => {
                warn!(node = %node.identifier(), error = %err, "Receive failed; treating as closure");
                drop(source);
                match client.reconnect().await {
                    Some(next) => {
                        source = next;
                        continue;
                    }
                    None => break,
                }
            }
        };

        node.metrics().record_frame();
        let frame = match Frame::decode(&text) {
            Ok(frame) => frame,
            Err(err) => {
                node.metrics().record_decode_failure();
                warn!(node = %node.identifier(), error = %err, "Dropping malformed frame");
                continue;
            }
        };

        let dispatcher = Arc::clone(client.dispatcher());
        let identifier = node.identifier().to_string();
        tokio::spawn(async move {
            if let Err(err) = dispatcher.process(frame).await {
                warn!(node = %identifier, error = %err, "Frame dispatch failed");
            }
        });
    }

    debug!(node = %node.identifier(), "Message pump stopped");
}

#[cfg(test)]
mod tests {
    use crate::config::NodeConfig;
    use crate::node::{ClientSettings, Node, NodeClient};
    use crate::readiness::Readiness;
    use crate::session::TrackedPlayer;
    use crate::testing::{MockConnector, Outcome, RecordingSink};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    async fn connected() -> (Arc<NodeClient>, crate::testing::Peer, Arc<RecordingSink>) {
        let node = Arc::new(Node::new(NodeConfig::new("main", "127.0.0.1", 2333, "pw"), 1));
        let connector = Arc::new(MockConnector::new(&[Outcome::Accept]));
        let sink = Arc::new(RecordingSink::new());
        let mut settings = ClientSettings::default();
        settings.auto_reconnect = false;
        let client = NodeClient::new(node, connector.clone(), sink.clone(), Readiness::ready(), settings);
        client.connect().await.unwrap();
        let peer = connector.next_peer().await;
        (client, peer, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frames_do_not_stop_the_pump() {
        let (client, peer, sink) = connected().await;
        client.node().sessions().insert(Arc::new(TrackedPlayer::new(42))).await;

        peer.push_raw("{not json");
        peer.push_raw("[1, 2, 3]");
        peer.push(json!({"op": "event", "type": "NoSuchEvent", "guildId": "42"}));
        peer.push(json!({"op": "event", "type": "TrackEndEvent", "guildId": "42", "track": "QAAA", "reason": "STOPPED"}));

        sink.wait_for("track_end", 1).await;
        assert!(client.is_connected());

        let metrics = client.node().metrics().snapshot();
        assert_eq!(metrics.frames_received, 4);
        assert_eq!(metrics.decode_failures, 2);
        assert_eq!(metrics.unknown_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_frame_updates_node_without_events() {
        let (client, peer, sink) = connected().await;

        peer.push(json!({
            "op": "stats",
            "players": 3,
            "playingPlayers": 2,
            "uptime": 1000,
            "memory": {"free": 1, "used": 1, "allocated": 1, "reservable": 1},
            "cpu": {"cores": 4, "systemLoad": 0.1, "lavalinkLoad": 0.01}
        }));

        for _ in 0..100 {
            if client.node().stats().await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(client.node().stats().await.map(|s| s.players), Some(3));
        assert_eq!(sink.names(), vec!["node_ready"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_connection_is_released_before_backoff() {
        let node = Arc::new(Node::new(NodeConfig::new("main", "127.0.0.1", 2333, "pw"), 1));
        let connector = Arc::new(MockConnector::new(&[Outcome::Accept]));
        let mut settings = ClientSettings::default();
        settings.backoff.base_ms = 60_000;
        settings.backoff.max_delay_ms = 60_000;
        let client = NodeClient::new(
            node,
            connector.clone(),
            Arc::new(RecordingSink::new()),
            Readiness::ready(),
            settings,
        );
        client.connect().await.unwrap();
        let peer = connector.next_peer().await;

        peer.fail("connection reset");
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Still inside the first backoff sleep, yet the read half is gone
        assert!(peer.is_released());
        assert_eq!(connector.attempt_count(), 1);
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_treated_as_closure() {
        let (client, peer, sink) = connected().await;

        peer.fail("connection reset");

        sink.wait_for("node_connection_closed", 1).await;
        assert!(!client.is_connected());
    }
}
