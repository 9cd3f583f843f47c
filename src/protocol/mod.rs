//! # Node Wire Protocol
//!
//! Everything that crosses the WebSocket: inbound frames keyed by `op`
//! (`stats`, `event`, `playerUpdate`), the typed payloads decoded from them,
//! and the operations the client sends back.

pub mod events;
pub mod frame;
pub mod stats;

pub use events::{EventKind, NodeEvent, PlayerState, PlayerUpdate};
pub use frame::{Frame, Op, Outbound};
pub use stats::{Penalty, Stats};
