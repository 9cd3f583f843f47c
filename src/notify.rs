//! # Notifications
//!
//! What the client tells the host process: node readiness, node connection
//! loss, and the typed events of each guild's session. The host plugs in any
//! `EventSink`; this crate only ever calls `emit`.
//!
//! ## Subscriber Failures:
//! A sink that returns an error or panics must not take the receive loop down
//! with it. `emit_guarded` catches both, logs them with the node and
//! notification name, and counts them on the node.

use crate::node::Node;
use crate::protocol::NodeEvent;
use crate::session::PlayerSession;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, trace};

#[derive(Clone)]
pub enum Notification {
    /// Handshake succeeded and the node is accepting work
    NodeReady { node: Arc<Node> },
    /// The connection closed and will not be re-established automatically
    NodeConnectionClosed { node: Arc<Node> },
    /// A session event, tagged with the node it came from and the resolved session
    Event {
        node: Arc<Node>,
        session: Arc<dyn PlayerSession>,
        event: NodeEvent,
    },
}

impl Notification {
    /// Listener name, e.g. `node_ready` or `track_end`.
    pub fn name(&self) -> &'static str {
        match self {
            Notification::NodeReady { .. } => "node_ready",
            Notification::NodeConnectionClosed { .. } => "node_connection_closed",
            Notification::Event { event, .. } => event.kind().listener_name(),
        }
    }

    pub fn node(&self) -> &Arc<Node> {
        match self {
            Notification::NodeReady { node }
            | Notification::NodeConnectionClosed { node }
            | Notification::Event { node, .. } => node,
        }
    }

    pub fn event(&self) -> Option<&NodeEvent> {
        match self {
            Notification::Event { event, .. } => Some(event),
            _ => None,
        }
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::NodeReady { node } | Notification::NodeConnectionClosed { node } => f
                .debug_struct(self.name())
                .field("node", &node.identifier())
                .finish(),
            Notification::Event { node, session, event } => f
                .debug_struct(self.name())
                .field("node", &node.identifier())
                .field("guild_id", &session.guild_id())
                .field("event", event)
                .finish(),
        }
    }
}

/// The single capability the client needs from its environment.
pub trait EventSink: Send + Sync {
    fn emit(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Fan-out sink over a tokio broadcast channel.
///
/// Having no subscribers at the moment of emission is not a failure.
/// Slow subscribers lag and lose the oldest notifications.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, notification: Notification) -> anyhow::Result<()> {
        let name = notification.name();
        if self.tx.send(notification).is_err() {
            trace!(notification = name, "No subscribers for notification");
        }
        Ok(())
    }
}

/// Deliver a notification, absorbing any subscriber failure.
///
/// Returns whether the sink accepted it.
pub fn emit_guarded(sink: &dyn EventSink, notification: Notification) -> bool {
    let name = notification.name();
    let node = notification.node().clone();

    match panic::catch_unwind(AssertUnwindSafe(|| sink.emit(notification))) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            node.metrics().record_subscriber_failure();
            error!(
                node = %node.identifier(),
                notification = name,
                error = ?err,
                "Subscriber failed to handle notification"
            );
            false
        }
        Err(payload) => {
            node.metrics().record_subscriber_failure();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(
                node = %node.identifier(),
                notification = name,
                panic = %message,
                "Subscriber panicked while handling notification"
            );
            false
        }
    }
}
