//! # WebSocket Transport
//!
//! `tokio-tungstenite` implementation of the transport traits.
//!
//! ## Connection Flow:
//! 1. **Request**: build the upgrade request for `ws(s)://host:port` and attach
//!    the handshake headers
//! 2. **Handshake**: `connect_async`; a 401 answer means a wrong password
//! 3. **Split**: the stream is split into a writer (sink) and a reader (source)
//!    so the pump can block on reads while the manager writes
//!
//! ## Control Frames:
//! Pings from the node are answered by tungstenite itself; the pong is flushed
//! with the next read or write. Pongs to our own heartbeat pings are swallowed.

use crate::error::{NodeError, NodeResult};
use crate::transport::{CloseInfo, Connection, Connector, FrameSink, FrameSource, Handshake, Inbound};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector that opens real WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, handshake: &Handshake) -> NodeResult<Connection> {
        let mut request = handshake
            .uri
            .as_str()
            .into_client_request()
            .map_err(NodeError::from)?;

        let headers = request.headers_mut();
        for (name, value) in handshake.headers() {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| NodeError::Config(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(&value).map_err(|e| {
                NodeError::Config(format!("invalid value for header {}: {}", name, e))
            })?;
            headers.insert(header, value);
        }

        let (stream, response) = tokio_tungstenite::connect_async(request).await?;
        debug!(
            uri = %handshake.uri,
            status = %response.status(),
            "WebSocket handshake completed"
        );

        let (writer, reader) = stream.split();
        Ok(Connection {
            sink: Box::new(WsSink { writer }),
            source: Box::new(WsSource { reader }),
        })
    }
}

struct WsSink {
    writer: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> NodeResult<()> {
        self.writer.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn send_ping(&mut self) -> NodeResult<()> {
        self.writer.send(Message::Ping(Vec::new())).await?;
        Ok(())
    }

    async fn close(&mut self) -> NodeResult<()> {
        self.writer.close().await?;
        Ok(())
    }
}

struct WsSource {
    reader: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> NodeResult<Inbound> {
        loop {
            let message = match self.reader.next().await {
                Some(message) => message?,
                None => return Ok(Inbound::Closed(None)),
            };

            match message {
                Message::Text(text) => return Ok(Inbound::Text(text)),
                Message::Binary(data) => return Ok(Inbound::Binary(data)),
                Message::Close(frame) => {
                    return Ok(Inbound::Closed(frame.map(|f| CloseInfo {
                        code: u16::from(f.code),
                        reason: f.reason.into_owned(),
                    })))
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("Control frame received");
                }
            }
        }
    }
}
