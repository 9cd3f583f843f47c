//! # Error Handling
//!
//! Defines the error type shared by every part of the node client and the
//! conversions that turn transport, decoding and configuration failures into it.
//!
//! ## Error Categories:
//! - **Authentication**: the node rejected our password during the handshake.
//!   Terminal for that attempt; the reconnect cycle does not retry it.
//! - **Transport**: any other connect-time or in-flight WebSocket failure.
//!   Triggers the backoff/reconnect cycle.
//! - **Decode**: a frame could not be parsed into the expected structure.
//!   The frame is dropped and the receive loop keeps going.
//! - **SessionUpdate**: the player layer failed to apply a `playerUpdate`.
//!   Reported by the dispatcher, owned by the session.
//!
//! Lookup misses (unknown guild, unknown event type) are not errors at all;
//! they are counted in the node metrics and logged at debug level.

use std::fmt;
use tokio_tungstenite::tungstenite;

/// Errors produced by the node client.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(NodeError::Transport("connection reset".to_string()));
/// ```
#[derive(Debug)]
pub enum NodeError {
    /// The node answered the upgrade request with HTTP 401
    Authentication {
        /// Identifier of the node that rejected us
        node: String,
    },

    /// Connecting, reading or writing on the WebSocket failed
    Transport(String),

    /// An inbound frame was not the structured JSON we expect
    Decode(String),

    /// Configuration file or environment variable problems
    Config(String),

    /// The host process never signalled readiness within the allowed time
    ReadinessTimeout {
        /// How long we waited, in milliseconds
        waited_ms: u64,
    },

    /// A session's state-update method returned an error
    SessionUpdate {
        /// Guild whose session rejected the update
        guild_id: u64,
        /// Error message from the session
        message: String,
    },

    /// A node identifier that is not present in the registry
    UnknownNode(String),
}

impl NodeError {
    /// Whether this failure should feed the backoff/reconnect cycle.
    ///
    /// Authentication failures are terminal: retrying with the same password
    /// can never succeed, so they are surfaced to the host process instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NodeError::Transport(_))
    }

    /// Attach the node identifier to an authentication failure raised by the
    /// transport layer, which does not know which node it was talking to.
    pub(crate) fn for_node(self, identifier: &str) -> Self {
        match self {
            NodeError::Authentication { .. } => NodeError::Authentication {
                node: identifier.to_string(),
            },
            other => other,
        }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Authentication { node } => {
                write!(f, "Authorization failed for node {}", node)
            }
            NodeError::Transport(msg) => write!(f, "Transport error: {}", msg),
            NodeError::Decode(msg) => write!(f, "Decode error: {}", msg),
            NodeError::Config(msg) => write!(f, "Configuration error: {}", msg),
            NodeError::ReadinessTimeout { waited_ms } => {
                write!(f, "Host process not ready after {}ms", waited_ms)
            }
            NodeError::SessionUpdate { guild_id, message } => {
                write!(f, "Session {} failed to apply update: {}", guild_id, message)
            }
            NodeError::UnknownNode(id) => write!(f, "Unknown node: {}", id),
        }
    }
}

impl std::error::Error for NodeError {}

/// Automatic conversion from WebSocket errors.
///
/// ## HTTP 401:
/// The only way the node tells us the password is wrong is by refusing the
/// upgrade with a 401 response, which tungstenite hands back as `Error::Http`.
/// The node identifier is filled in by the caller via `for_node`.
///
/// ## Malformed URLs:
/// `Url` and `HttpFormat` errors come from a host or port that can never form
/// a valid request, so they become `Config` and are never retried.
impl From<tungstenite::Error> for NodeError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) if response.status().as_u16() == 401 => {
                NodeError::Authentication {
                    node: String::new(),
                }
            }
            tungstenite::Error::Url(err) => NodeError::Config(format!("invalid node URL: {}", err)),
            tungstenite::Error::HttpFormat(err) => {
                NodeError::Config(format!("invalid node URL: {}", err))
            }
            other => NodeError::Transport(other.to_string()),
        }
    }
}

/// Automatic conversion from JSON parsing errors.
///
/// Both inbound frames and outbound payloads go through serde_json, and a
/// failure there is always a shape problem rather than a transport problem.
impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::Decode(format!("JSON error: {}", err))
    }
}

impl From<config::ConfigError> for NodeError {
    fn from(err: config::ConfigError) -> Self {
        NodeError::Config(err.to_string())
    }
}

/// Type alias for Results that use the node client's error type.
pub type NodeResult<T> = Result<T, NodeError>;
