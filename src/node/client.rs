//! # Connection Manager
//!
//! `NodeClient` owns the live connection to one node: it performs the
//! handshake, tracks connection and availability state, runs the heartbeat,
//! and drives the reconnect cycle when the pump reports a closure.
//!
//! ## State:
//! - **writer**: the send half of the live connection, `None` while disconnected
//! - **pump**: handle of the running receive loop plus a slot for a fresh
//!   receive half that a concurrent `connect()` hands over
//! - **backoff**: reconnect delays, reset exactly once per successful handshake
//!
//! ## Locking:
//! `connect_lock` serializes handshakes so a node never has two live
//! connections. The writer lock is the only lock held across a transport write.
//!
//! ## Rust Concepts:
//!
//! ### `self: &Arc<Self>` receivers
//! - **Purpose**: methods like `connect` can clone the `Arc` and move it into a
//!   spawned task (the pump, the heartbeat)
//! - **Result**: the client lives as long as any task still needs it
//!
//! ### tokio `Mutex` vs atomics
//! - **tokio::sync::Mutex**: used where the guard is held across an `.await`
//!   (the handshake, a socket write)
//! - **AtomicBool**: used for single flags (`connected`, `auto_reconnect`) that
//!   are read far more often than written and never need a guard
//!
//! ### `Weak` in the heartbeat
//! - The heartbeat task holds a `Weak<NodeClient>` and upgrades it on each tick
//! - Once the last `Arc` is gone the upgrade fails and the task ends on its own
//!
//! ## Which errors end the reconnect cycle:
//! - Transport failures: retried after the next backoff delay
//! - Authentication and configuration errors: the cycle stops and
//!   `node_connection_closed` fires, since the same handshake would fail again

use crate::config::{AppConfig, BackoffConfig};          // Client-wide and backoff settings
use crate::error::{NodeError, NodeResult};              // Error taxonomy with retry classification
use crate::node::backoff::ExponentialBackoff;           // Reconnect delays
use crate::node::dispatch::Dispatcher;                  // Routes decoded frames
use crate::node::{pump, Node};
use crate::notify::{emit_guarded, EventSink, Notification};
use crate::protocol::Outbound;
use crate::readiness::Readiness;                        // Host readiness latch
use crate::transport::{Connector, FrameSink, FrameSource, Handshake};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};          // Lock-free flags
use std::sync::{Arc, Weak};                             // Shared ownership, non-owning heartbeat handle
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};               // Async-aware locks that can be held across .await
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Client-wide settings every `NodeClient` is built with.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub user_id: u64,
    pub client_name: String,
    pub user_agent: String,
    pub shard_count: u32,
    pub readiness_timeout: Duration,
    pub auto_reconnect: bool,
    pub backoff: BackoffConfig,
}

impl ClientSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            user_id: config.client.user_id,
            client_name: config.client.client_name.clone(),
            user_agent: config.client.user_agent.clone(),
            shard_count: config.client.shard_count,
            readiness_timeout: Duration::from_millis(config.client.readiness_timeout_ms),
            auto_reconnect: config.client.auto_reconnect,
            backoff: config.backoff.clone(),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Default)]
struct PumpSlot {
    handle: Option<JoinHandle<()>>,
    /// Receive half established by `connect()` while the pump was reconnecting
    pending: Option<Box<dyn FrameSource>>,
}

pub struct NodeClient {
    node: Arc<Node>,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn EventSink>,
    readiness: Readiness,
    settings: ClientSettings,
    dispatcher: Arc<Dispatcher>,
    auto_reconnect: AtomicBool,
    connected: AtomicBool,
    writer: Mutex<Option<Box<dyn FrameSink>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    pump: Mutex<PumpSlot>,
    handoff: Notify,
    backoff: Mutex<ExponentialBackoff>,
    last_error: RwLock<Option<String>>,
    connect_lock: Mutex<()>,
}

impl NodeClient {
    pub fn new(
        node: Arc<Node>,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn EventSink>,
        readiness: Readiness,
        settings: ClientSettings,
    ) -> Arc<Self> {
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&node), Arc::clone(&sink)));
        let backoff = ExponentialBackoff::from_config(&settings.backoff);

        Arc::new(Self {
            node,
            connector,
            sink,
            readiness,
            dispatcher,
            auto_reconnect: AtomicBool::new(settings.auto_reconnect),
            connected: AtomicBool::new(false),
            writer: Mutex::new(None),
            heartbeat: Mutex::new(None),
            pump: Mutex::new(PumpSlot::default()),
            handoff: Notify::new(),
            backoff: Mutex::new(backoff),
            last_error: RwLock::new(None),
            connect_lock: Mutex::new(()),
            settings,
        })
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Whether a live connection exists and has not been closed.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::SeqCst)
    }

    /// Takes effect at the next closure, or after the current backoff sleep
    /// if a reconnect cycle is already running.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.auto_reconnect.store(enabled, Ordering::SeqCst);
        info!(node = %self.node.identifier(), enabled, "Auto-reconnect toggled");
    }

    /// Message of the most recent handshake failure, cleared on success.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Reconnect delays handed out since the last successful handshake.
    pub async fn backoff_attempts(&self) -> u32 {
        self.backoff.lock().await.attempts()
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Wait for the host to be ready, then perform the handshake.
    ///
    /// Returns immediately if already connected. An authentication failure is
    /// returned as-is and never retried here. Any other failure is returned
    /// too, and with auto-reconnect enabled it also starts the reconnect cycle.
    pub async fn connect(self: &Arc<Self>) -> NodeResult<()> {
        self.readiness.wait(self.settings.readiness_timeout).await?;

        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            debug!(node = %self.node.identifier(), "Already connected");
            return Ok(());
        }

        match self.open_connection().await {
            Ok(source) => {
                self.hand_off(source).await;
                self.finish_connect().await;
                Ok(())
            }
            Err(err) => {
                if err.is_retryable() && self.auto_reconnect() {
                    self.ensure_pump().await;
                }
                Err(err)
            }
        }
    }

    /// Serialize `payload` and write it as one text frame.
    ///
    /// A no-op while disconnected. Write errors are swallowed when the
    /// connection went away in the meantime, and returned otherwise.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> NodeResult<()> {
        if !self.is_connected() {
            debug!(node = %self.node.identifier(), "Not connected; dropping outbound payload");
            return Ok(());
        }

        let text = serde_json::to_string(payload)?;
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Ok(());
        };

        debug!(node = %self.node.identifier(), payload = %text, "Sending payload");
        match sink.send_text(text).await {
            Ok(()) => Ok(()),
            Err(err) if !self.is_connected() => {
                debug!(node = %self.node.identifier(), error = %err, "Send failed after disconnect");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Stop everything for good: no reconnect, no pump, no heartbeat.
    pub async fn shutdown(&self) {
        self.auto_reconnect.store(false, Ordering::SeqCst);
        {
            let mut slot = self.pump.lock().await;
            slot.pending = None;
            if let Some(handle) = slot.handle.take() {
                handle.abort();
            }
        }
        self.mark_closed().await;
        info!(node = %self.node.identifier(), "Node client shut down");
    }

    fn handshake(&self) -> Handshake {
        Handshake {
            uri: self.node.uri(),
            password: self.node.config().password.clone(),
            resume_key: self.node.resume_key().to_string(),
            user_id: self.settings.user_id,
            shard_count: self.node.shard_count(),
            client_name: self.settings.client_name.clone(),
            user_agent: self.settings.user_agent.clone(),
        }
    }

    /// One handshake attempt. Installs the writer and heartbeat on success and
    /// returns the receive half for the pump.
    async fn open_connection(self: &Arc<Self>) -> NodeResult<Box<dyn FrameSource>> {
        self.node.metrics().record_connect_attempt();
        let uri = self.node.uri();

        match self.connector.connect(&self.handshake()).await {
            Ok(connection) => {
                *self.writer.lock().await = Some(connection.sink);
                self.connected.store(true, Ordering::SeqCst);
                self.node.set_available(true);
                *self.last_error.write().await = None;
                self.start_heartbeat().await;
                info!(node = %self.node.identifier(), uri = %uri, "Connected to node");
                Ok(connection.source)
            }
            Err(err) => {
                let err = err.for_node(self.node.identifier());
                *self.last_error.write().await = Some(err.to_string());
                self.node.set_available(false);
                match &err {
                    NodeError::Authentication { .. } => error!(
                        node = %self.node.identifier(),
                        uri = %uri,
                        "Authorization failed; check the node password"
                    ),
                    other => error!(
                        node = %self.node.identifier(),
                        uri = %uri,
                        error = %other,
                        "Failed to connect to node"
                    ),
                }
                Err(err)
            }
        }
    }

    /// Post-handshake steps shared by `connect()` and the reconnect cycle.
    async fn finish_connect(&self) {
        self.backoff.lock().await.reset();

        if let Some(timeout) = self.node.config().resume_timeout_secs {
            let configure = Outbound::ConfigureResuming {
                key: self.node.resume_key().to_string(),
                timeout,
            };
            if let Err(err) = self.send(&configure).await {
                warn!(node = %self.node.identifier(), error = %err, "Failed to configure resuming");
            }
        }

        emit_guarded(
            self.sink.as_ref(),
            Notification::NodeReady {
                node: Arc::clone(&self.node),
            },
        );
    }

    /// Give a fresh receive half to the running pump, or start one.
    async fn hand_off(self: &Arc<Self>, source: Box<dyn FrameSource>) {
        let mut slot = self.pump.lock().await;
        let running = slot.handle.as_ref().is_some_and(|h| !h.is_finished());
        if running {
            slot.pending = Some(source);
            self.handoff.notify_one();
        } else {
            slot.handle = Some(tokio::spawn(pump::run(Arc::clone(self), Some(source))));
        }
    }

    /// Start a pump with no connection so it enters the reconnect cycle.
    async fn ensure_pump(self: &Arc<Self>) {
        let mut slot = self.pump.lock().await;
        let running = slot.handle.as_ref().is_some_and(|h| !h.is_finished());
        if !running {
            slot.handle = Some(tokio::spawn(pump::run(Arc::clone(self), None)));
        }
    }

    async fn take_pending(&self) -> Option<Box<dyn FrameSource>> {
        self.pump.lock().await.pending.take()
    }

    /// Called by the exiting pump. Returns a pending receive half if a
    /// concurrent `connect()` just produced one; otherwise the pump is done
    /// and the host is told the node is gone.
    async fn stop_pump(&self) -> Option<Box<dyn FrameSource>> {
        {
            let mut slot = self.pump.lock().await;
            if let Some(source) = slot.pending.take() {
                return Some(source);
            }
            slot.handle = None;
        }

        info!(node = %self.node.identifier(), "Connection closed; not reconnecting");
        emit_guarded(
            self.sink.as_ref(),
            Notification::NodeConnectionClosed {
                node: Arc::clone(&self.node),
            },
        );
        None
    }

    async fn mark_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.node.set_available(false);

        if let Some(mut sink) = self.writer.lock().await.take() {
            if let Err(err) = sink.close().await {
                debug!(node = %self.node.identifier(), error = %err, "Error closing writer");
            }
        }
        if let Some(handle) = self.heartbeat.lock().await.take() {
            handle.abort();
        }
    }

    /// The pump observed a closure. Back off and reconnect until that
    /// succeeds or auto-reconnect is off; `None` tells the pump to exit.
    pub(crate) async fn reconnect(self: &Arc<Self>) -> Option<Box<dyn FrameSource>> {
        self.mark_closed().await;

        loop {
            if !self.auto_reconnect() {
                return self.stop_pump().await;
            }

            let delay = self.backoff.lock().await.next_delay();
            warn!(
                node = %self.node.identifier(),
                delay_ms = delay.as_millis() as u64,
                "Connection lost; reconnecting after backoff"
            );
            if self.sleep_or_handoff(delay).await {
                if let Some(source) = self.take_pending().await {
                    return Some(source);
                }
            }

            if !self.auto_reconnect() {
                return self.stop_pump().await;
            }

            if let Err(err) = self.readiness.wait(self.settings.readiness_timeout).await {
                warn!(node = %self.node.identifier(), error = %err, "Host not ready; retrying later");
                continue;
            }

            let _guard = self.connect_lock.lock().await;
            if let Some(source) = self.take_pending().await {
                return Some(source);
            }

            self.node.metrics().record_reconnect_attempt();
            match self.open_connection().await {
                Ok(source) => {
                    self.finish_connect().await;
                    return Some(source);
                }
                // Wrong password or an unusable address: retrying cannot help
                Err(err) if !err.is_retryable() => {
                    return self.stop_pump().await;
                }
                Err(_) => continue,
            }
        }
    }

    /// Sleep for `delay`, waking early only if a receive half was handed over.
    async fn sleep_or_handoff(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return false,
                _ = self.handoff.notified() => {
                    if self.pump.lock().await.pending.is_some() {
                        return true;
                    }
                }
            }
        }
    }

    async fn start_heartbeat(self: &Arc<Self>) {
        let Some(interval) = self.node.config().heartbeat() else {
            return;
        };

        let client = Arc::downgrade(self);
        let handle = tokio::spawn(heartbeat(client, interval));
        if let Some(previous) = self.heartbeat.lock().await.replace(handle) {
            previous.abort();
        }
    }
}

/// Ping the node every `interval` until the connection or the client is gone.
async fn heartbeat(client: Weak<NodeClient>, interval: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    loop {
        ticker.tick().await;
        let Some(client) = client.upgrade() else {
            return;
        };
        if !client.is_connected() {
            return;
        }

        let mut writer = client.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return;
        };
        if let Err(err) = sink.send_ping().await {
            // The pump sees the broken connection on its next read
            debug!(node = %client.node.identifier(), error = %err, "Heartbeat ping failed");
            return;
        }
    }
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("node", &self.node.identifier())
            .field("connected", &self.is_connected())
            .field("auto_reconnect", &self.auto_reconnect())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::session::TrackedPlayer;
    use crate::testing::{MockConnector, Outcome, RecordingSink, Sent};
    use serde_json::json;

    fn settings(auto_reconnect: bool) -> ClientSettings {
        ClientSettings {
            user_id: 42,
            client_name: "test-client".to_string(),
            user_agent: "test-client/1.0".to_string(),
            shard_count: 1,
            readiness_timeout: Duration::from_secs(5),
            auto_reconnect,
            backoff: BackoffConfig {
                base_ms: 100,
                max_exponent: 10,
                max_delay_ms: 1_000,
                jitter: 0.0,
            },
        }
    }

    fn client_with(
        config: NodeConfig,
        script: &[Outcome],
        auto_reconnect: bool,
    ) -> (Arc<NodeClient>, Arc<MockConnector>, Arc<RecordingSink>) {
        let node = Arc::new(Node::new(config, 1));
        let connector = Arc::new(MockConnector::new(script));
        let sink = Arc::new(RecordingSink::new());
        let client = NodeClient::new(
            node,
            connector.clone(),
            sink.clone(),
            Readiness::ready(),
            settings(auto_reconnect),
        );
        (client, connector, sink)
    }

    fn client(
        script: &[Outcome],
        auto_reconnect: bool,
    ) -> (Arc<NodeClient>, Arc<MockConnector>, Arc<RecordingSink>) {
        client_with(
            NodeConfig::new("main", "127.0.0.1", 2333, "pw"),
            script,
            auto_reconnect,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success_marks_ready_once() {
        let (client, connector, sink) = client(&[Outcome::Accept], true);

        client.connect().await.unwrap();

        assert!(client.is_connected());
        assert!(client.node().is_available());
        assert_eq!(client.backoff_attempts().await, 0);
        assert_eq!(client.last_error().await, None);
        assert_eq!(sink.count("node_ready"), 1);

        // A second connect is a no-op
        client.connect().await.unwrap();
        assert_eq!(connector.attempt_count(), 1);
        assert_eq!(sink.count("node_ready"), 1);

        let handshake = connector.last_handshake().unwrap();
        assert_eq!(handshake.uri, "ws://127.0.0.1:2333");
        assert_eq!(handshake.user_id, 42);
        assert_eq!(handshake.resume_key, client.node().resume_key());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_waits_for_readiness() {
        let node = Arc::new(Node::new(NodeConfig::new("main", "127.0.0.1", 2333, "pw"), 1));
        let connector = Arc::new(MockConnector::new(&[Outcome::Accept]));
        let readiness = Readiness::new();
        let client = NodeClient::new(
            node,
            connector.clone(),
            Arc::new(RecordingSink::new()),
            readiness.clone(),
            settings(false),
        );

        let pending = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.connect().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(connector.attempt_count(), 0);

        readiness.mark_ready();
        pending.await.unwrap().unwrap();
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out_without_readiness() {
        let node = Arc::new(Node::new(NodeConfig::new("main", "127.0.0.1", 2333, "pw"), 1));
        let connector = Arc::new(MockConnector::new(&[Outcome::Accept]));
        let client = NodeClient::new(
            node,
            connector.clone(),
            Arc::new(RecordingSink::new()),
            Readiness::new(),
            settings(true),
        );

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, NodeError::ReadinessTimeout { waited_ms: 5_000 }));
        assert_eq!(connector.attempt_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_is_not_retried() {
        let (client, connector, sink) = client(&[Outcome::Reject], true);

        let err = client.connect().await.unwrap_err();

        match err {
            NodeError::Authentication { node } => assert_eq!(node, "main"),
            other => panic!("expected authentication failure, got {:?}", other),
        }
        assert!(!client.is_connected());
        assert!(!client.node().is_available());
        assert!(client.last_error().await.unwrap().contains("Authorization failed"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempt_count(), 1);
        assert!(sink.names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_at_connect_enters_reconnect_cycle() {
        let (client, connector, sink) =
            client(&[Outcome::Fail, Outcome::Fail, Outcome::Accept], true);

        let err = client.connect().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(client.last_error().await.is_some());

        sink.wait_for("node_ready", 1).await;
        assert!(client.is_connected());
        assert_eq!(connector.attempt_count(), 3);
        assert_eq!(client.backoff_attempts().await, 0);
        assert_eq!(client.last_error().await, None);
        assert_eq!(client.node().metrics().snapshot().reconnect_attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_without_auto_reconnect_stops_for_good() {
        let (client, connector, sink) = client(&[Outcome::Accept, Outcome::Accept], false);
        client.connect().await.unwrap();
        let peer = connector.next_peer().await;

        peer.close(1000, "bye");
        sink.wait_for("node_connection_closed", 1).await;

        assert!(!client.is_connected());
        assert!(!client.node().is_available());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.attempt_count(), 1);
        assert_eq!(sink.count("node_connection_closed"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_delays_grow_then_reset_after_success() {
        let (client, connector, sink) = client(
            &[
                Outcome::Accept,
                Outcome::Fail,
                Outcome::Fail,
                Outcome::Fail,
                Outcome::Accept,
                Outcome::Accept,
            ],
            true,
        );
        client.connect().await.unwrap();

        let first = connector.next_peer().await;
        let dropped_at = Instant::now();
        first.fail("connection reset by peer");
        sink.wait_for("node_ready", 2).await;

        let times = connector.attempt_times();
        let gaps: Vec<Duration> = std::iter::once(times[1] - dropped_at)
            .chain(times[1..5].windows(2).map(|w| w[1] - w[0]))
            .collect();
        for pair in gaps.windows(2) {
            assert!(pair[1] >= pair[0], "delays decreased: {:?}", gaps);
        }
        assert_eq!(gaps[0], Duration::from_millis(100));
        assert_eq!(client.backoff_attempts().await, 0);

        // After the successful reconnect, the next failure starts from the minimum again
        let second = connector.next_peer().await;
        let dropped_at = Instant::now();
        second.close(1006, "abnormal");
        sink.wait_for("node_ready", 3).await;

        let times = connector.attempt_times();
        assert_eq!(times[5] - dropped_at, Duration::from_millis(100));
        assert_eq!(sink.count("node_connection_closed"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_during_reconnect_ends_cycle() {
        let (client, connector, sink) = client(&[Outcome::Accept, Outcome::Reject], true);
        client.connect().await.unwrap();

        connector.next_peer().await.close(4001, "restarting");
        sink.wait_for("node_connection_closed", 1).await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.attempt_count(), 2);
        assert!(!client.node().is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_address_is_not_retried() {
        let (client, connector, sink) = client_with(
            NodeConfig::new("main", "bad host", 2333, "pw"),
            &[Outcome::Invalid],
            true,
        );

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, NodeError::Config(_)), "{:?}", err);
        assert!(!err.is_retryable());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.attempt_count(), 1);
        assert_eq!(client.node().metrics().snapshot().reconnect_attempts, 0);
        assert!(sink.names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_error_during_reconnect_ends_cycle() {
        let (client, connector, sink) =
            client(&[Outcome::Accept, Outcome::Fail, Outcome::Invalid], true);
        client.connect().await.unwrap();

        connector.next_peer().await.close(1006, "gone");
        sink.wait_for("node_connection_closed", 1).await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.attempt_count(), 3);
        assert_eq!(client.node().metrics().snapshot().reconnect_attempts, 2);
        assert!(!client.node().is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_auto_reconnect_during_backoff_stops_cycle() {
        let (client, connector, sink) = client(&[Outcome::Accept], true);
        client.connect().await.unwrap();

        connector.next_peer().await.close(1006, "gone");
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.set_auto_reconnect(false);

        sink.wait_for("node_connection_closed", 1).await;
        assert_eq!(connector.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_during_reconnect_hands_connection_to_pump() {
        let mut settings = settings(true);
        settings.backoff.base_ms = 60_000;
        settings.backoff.max_delay_ms = 60_000;
        let node = Arc::new(Node::new(NodeConfig::new("main", "127.0.0.1", 2333, "pw"), 1));
        let connector = Arc::new(MockConnector::new(&[Outcome::Accept, Outcome::Accept]));
        let sink = Arc::new(RecordingSink::new());
        let client = NodeClient::new(
            Arc::clone(&node),
            connector.clone(),
            sink.clone(),
            Readiness::ready(),
            settings,
        );
        client.connect().await.unwrap();
        connector.next_peer().await.close(1006, "gone");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!client.is_connected());

        // Operator connects by hand long before the backoff expires
        client.connect().await.unwrap();
        let peer = connector.next_peer().await;
        node.sessions().insert(Arc::new(TrackedPlayer::new(42))).await;
        peer.push(json!({"op": "event", "type": "TrackStartEvent", "guildId": "42", "track": "QAAA"}));

        sink.wait_for("track_start", 1).await;
        assert_eq!(connector.attempt_count(), 2);
        assert_eq!(sink.count("node_ready"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_disconnected_is_noop() {
        let (client, connector, _sink) = client(&[], false);

        client.send(&json!({"op": "ping"})).await.unwrap();

        assert_eq!(connector.attempt_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_writes_single_text_frame() {
        let (client, connector, _sink) = client(&[Outcome::Accept], false);
        client.connect().await.unwrap();
        let mut peer = connector.next_peer().await;

        client
            .send(&json!({"op": "volume", "guildId": "42", "volume": 50}))
            .await
            .unwrap();

        assert_eq!(
            peer.texts(),
            vec![json!({"op": "volume", "guildId": "42", "volume": 50})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_resuming_sent_after_handshake() {
        let mut config = NodeConfig::new("main", "127.0.0.1", 2333, "pw");
        config.resume_key = Some("resume-me".to_string());
        config.resume_timeout_secs = Some(60);
        let (client, connector, _sink) = client_with(config, &[Outcome::Accept], false);

        client.connect().await.unwrap();
        let mut peer = connector.next_peer().await;

        assert_eq!(
            peer.texts(),
            vec![json!({"op": "configureResuming", "key": "resume-me", "timeout": 60})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_on_interval() {
        let mut config = NodeConfig::new("main", "127.0.0.1", 2333, "pw");
        config.heartbeat_secs = Some(30);
        let (client, connector, _sink) = client_with(config, &[Outcome::Accept], false);
        client.connect().await.unwrap();
        let mut peer = connector.next_peer().await;

        tokio::time::sleep(Duration::from_secs(95)).await;

        let pings = peer.drain().into_iter().filter(|s| *s == Sent::Ping).count();
        assert_eq!(pings, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_without_notification() {
        let (client, connector, sink) = client(&[Outcome::Accept], true);
        client.connect().await.unwrap();
        let mut peer = connector.next_peer().await;

        client.shutdown().await;

        assert!(!client.is_connected());
        assert!(!client.node().is_available());
        assert!(!client.auto_reconnect());
        assert!(peer.drain().contains(&Sent::Close));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.attempt_count(), 1);
        assert_eq!(sink.count("node_connection_closed"), 0);
    }
}
