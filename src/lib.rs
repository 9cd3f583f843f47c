//! # Audio Node Client
//!
//! Keeps persistent WebSocket sessions with remote audio nodes, turns their
//! frames into typed events and reconnects with exponential backoff when a
//! connection drops.
//!
//! ## Module Organization:
//! - `config`: layered configuration (defaults, file, environment)
//! - `error`: the crate's error type
//! - `transport`: connection traits and the WebSocket implementation
//! - `protocol`: wire frames, statistics and typed events
//! - `node`: node state, connection manager, message pump, dispatcher, backoff
//! - `session`: the seam to the player layer
//! - `notify`: notifications to the host process
//! - `readiness`: host readiness signal awaited before any handshake
//! - `registry`: all nodes of the process
//! - `health`: JSON health report

pub mod config;
pub mod error;
pub mod health;
pub mod node;
pub mod notify;
pub mod protocol;
pub mod readiness;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, NodeConfig};
pub use error::{NodeError, NodeResult};
pub use node::{ClientSettings, Node, NodeClient};
pub use notify::{BroadcastSink, EventSink, Notification};
pub use protocol::{EventKind, NodeEvent, PlayerUpdate, Stats};
pub use readiness::Readiness;
pub use registry::NodeRegistry;
pub use session::{PlayerSession, TrackedPlayer};
pub use transport::WsConnector;
