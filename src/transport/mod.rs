//! # Transport
//!
//! The duplex text channel between the client and a node, split into the two
//! halves the rest of the crate needs:
//! - **FrameSource**: the read half, owned by the message pump
//! - **FrameSink**: the write half, owned by the connection manager
//!
//! A `Connector` performs the handshake and hands back both halves. The
//! WebSocket implementation lives in `websocket`; tests script their own.

pub mod websocket;

use crate::error::NodeResult;
use async_trait::async_trait;

pub use websocket::WsConnector;

/// Everything the node needs to know about us at connect time.
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    /// `ws://host:port` or `wss://host:port`
    pub uri: String,
    pub password: String,
    pub resume_key: String,
    pub user_id: u64,
    pub shard_count: u32,
    pub client_name: String,
    pub user_agent: String,
}

impl Handshake {
    /// Header name/value pairs sent with the upgrade request.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Authorization", self.password.clone()),
            ("Resume-Key", self.resume_key.clone()),
            ("User-Id", self.user_id.to_string()),
            ("Num-Shards", self.shard_count.to_string()),
            ("Client-Name", self.client_name.clone()),
            ("User-Agent", self.user_agent.clone()),
        ]
    }
}

/// Close details reported by the remote end, when it sent any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// Outcome of one receive on the read half.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    /// The connection is gone; `None` when it ended without a close frame
    Closed(Option<CloseInfo>),
}

#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame. Control frames are handled internally.
    async fn recv(&mut self) -> NodeResult<Inbound>;
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> NodeResult<()>;

    async fn send_ping(&mut self) -> NodeResult<()>;

    async fn close(&mut self) -> NodeResult<()>;
}

/// Both halves of a freshly established connection.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake. A rejected password surfaces as
    /// `NodeError::Authentication`, anything else as `NodeError::Transport`.
    async fn connect(&self, handshake: &Handshake) -> NodeResult<Connection>;
}
