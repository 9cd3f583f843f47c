//! Scripted transport and recording sink for tests.

use crate::error::{NodeError, NodeResult};
use crate::notify::{EventSink, Notification};
use crate::transport::{CloseInfo, Connection, Connector, FrameSink, FrameSource, Handshake, Inbound};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What the scripted connector does with the next handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Accept,
    Reject,
    Fail,
    /// The handshake request cannot even be built
    Invalid,
}

/// Something the client wrote to an in-memory connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Text(String),
    Ping,
    Close,
}

/// The node's end of an in-memory connection.
pub(crate) struct Peer {
    inbound: mpsc::UnboundedSender<NodeResult<Inbound>>,
    outbound: mpsc::UnboundedReceiver<Sent>,
}

impl Peer {
    pub(crate) fn push(&self, value: serde_json::Value) {
        let _ = self.inbound.send(Ok(Inbound::Text(value.to_string())));
    }

    pub(crate) fn push_raw(&self, text: &str) {
        let _ = self.inbound.send(Ok(Inbound::Text(text.to_string())));
    }

    pub(crate) fn close(&self, code: u16, reason: &str) {
        let _ = self.inbound.send(Ok(Inbound::Closed(Some(CloseInfo {
            code,
            reason: reason.to_string(),
        }))));
    }

    pub(crate) fn fail(&self, message: &str) {
        let _ = self.inbound.send(Err(NodeError::Transport(message.to_string())));
    }

    /// Whether the client dropped its receive half of this connection.
    pub(crate) fn is_released(&self) -> bool {
        self.inbound.is_closed()
    }

    /// Everything the client wrote so far.
    pub(crate) fn drain(&mut self) -> Vec<Sent> {
        let mut sent = Vec::new();
        while let Ok(item) = self.outbound.try_recv() {
            sent.push(item);
        }
        sent
    }

    pub(crate) fn texts(&mut self) -> Vec<serde_json::Value> {
        self.drain()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text(text) => serde_json::from_str(&text).ok(),
                _ => None,
            })
            .collect()
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<NodeResult<Inbound>>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn recv(&mut self) -> NodeResult<Inbound> {
        match self.rx.recv().await {
            Some(inbound) => inbound,
            None => Ok(Inbound::Closed(None)),
        }
    }
}

struct MemorySink {
    tx: mpsc::UnboundedSender<Sent>,
}

impl MemorySink {
    fn push(&self, sent: Sent) -> NodeResult<()> {
        self.tx
            .send(sent)
            .map_err(|_| NodeError::Transport("peer gone".to_string()))
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> NodeResult<()> {
        self.push(Sent::Text(text))
    }

    async fn send_ping(&mut self) -> NodeResult<()> {
        self.push(Sent::Ping)
    }

    async fn close(&mut self) -> NodeResult<()> {
        self.push(Sent::Close)
    }
}

/// Connector that follows a script of outcomes, then fails every attempt.
#[derive(Default)]
pub(crate) struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    attempts: Mutex<Vec<(Instant, Handshake)>>,
    peers: Mutex<VecDeque<Peer>>,
}

impl MockConnector {
    pub(crate) fn new(script: &[Outcome]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub(crate) fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub(crate) fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub(crate) fn last_handshake(&self) -> Option<Handshake> {
        self.attempts.lock().unwrap().last().map(|(_, hs)| hs.clone())
    }

    /// Wait (on the test clock) for the next accepted connection.
    pub(crate) async fn next_peer(&self) -> Peer {
        loop {
            if let Some(peer) = self.peers.lock().unwrap().pop_front() {
                return peer;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, handshake: &Handshake) -> NodeResult<Connection> {
        self.attempts
            .lock()
            .unwrap()
            .push((Instant::now(), handshake.clone()));
        let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Outcome::Fail);

        match outcome {
            Outcome::Accept => {
                let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                self.peers.lock().unwrap().push_back(Peer {
                    inbound: inbound_tx,
                    outbound: outbound_rx,
                });
                Ok(Connection {
                    sink: Box::new(MemorySink { tx: outbound_tx }),
                    source: Box::new(MemorySource { rx: inbound_rx }),
                })
            }
            Outcome::Reject => Err(NodeError::Authentication {
                node: String::new(),
            }),
            Outcome::Fail => Err(NodeError::Transport("connection refused".to_string())),
            Outcome::Invalid => Err(NodeError::Config(format!(
                "invalid node URL: {}",
                handshake.uri
            ))),
        }
    }
}

/// Sink that keeps every notification it accepts.
#[derive(Default)]
pub(crate) struct RecordingSink {
    seen: Mutex<Vec<Notification>>,
    fail_next: AtomicBool,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make the next `emit` return an error instead of recording.
    pub(crate) fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.seen.lock().unwrap().iter().map(Notification::name).collect()
    }

    pub(crate) fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|n| *n == name).count()
    }

    pub(crate) fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }

    /// Wait (on the test clock) until `name` has been seen `count` times.
    pub(crate) async fn wait_for(&self, name: &str, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(3600);
        while self.count(name) < count {
            assert!(Instant::now() < deadline, "timed out waiting for {}", name);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, notification: Notification) -> anyhow::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(anyhow::anyhow!("recording sink told to fail"));
        }
        self.seen.lock().unwrap().push(notification);
        Ok(())
    }
}
