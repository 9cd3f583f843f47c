//! # Node Events
//!
//! Typed payloads for `event` and `playerUpdate` frames, and the fixed table
//! that maps wire event names to them.
//!
//! ## Event Table:
//! | wire `type`              | kind                | listener name       |
//! |--------------------------|---------------------|---------------------|
//! | `TrackStartEvent`        | `TrackStart`        | `track_start`       |
//! | `TrackEndEvent`          | `TrackEnd`          | `track_end`         |
//! | `TrackExceptionEvent`    | `TrackException`    | `track_exception`   |
//! | `TrackStuckEvent`        | `TrackStuck`        | `track_stuck`       |
//! | `WebSocketClosedEvent`   | `WebsocketClosed`   | `websocket_closed`  |
//!
//! Unknown names map to `None` and are skipped by the dispatcher, so a node
//! that grows new event kinds never breaks the client. Adding a kind means
//! adding a variant here; every match over `EventKind` is exhaustive.

use crate::error::NodeResult;
use crate::protocol::frame::{deserialize_guild_id, Frame};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    TrackStart,
    TrackEnd,
    TrackException,
    TrackStuck,
    WebsocketClosed,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::TrackStart,
        EventKind::TrackEnd,
        EventKind::TrackException,
        EventKind::TrackStuck,
        EventKind::WebsocketClosed,
    ];

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "TrackStartEvent" => Some(EventKind::TrackStart),
            "TrackEndEvent" => Some(EventKind::TrackEnd),
            "TrackExceptionEvent" => Some(EventKind::TrackException),
            "TrackStuckEvent" => Some(EventKind::TrackStuck),
            "WebSocketClosedEvent" => Some(EventKind::WebsocketClosed),
            _ => None,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            EventKind::TrackStart => "TrackStartEvent",
            EventKind::TrackEnd => "TrackEndEvent",
            EventKind::TrackException => "TrackExceptionEvent",
            EventKind::TrackStuck => "TrackStuckEvent",
            EventKind::WebsocketClosed => "WebSocketClosedEvent",
        }
    }

    /// Name subscribers listen for.
    pub fn listener_name(&self) -> &'static str {
        match self {
            EventKind::TrackStart => "track_start",
            EventKind::TrackEnd => "track_end",
            EventKind::TrackException => "track_exception",
            EventKind::TrackStuck => "track_stuck",
            EventKind::WebsocketClosed => "websocket_closed",
        }
    }

    /// Build the typed event for this kind from a frame.
    pub fn decode(self, frame: &Frame) -> NodeResult<NodeEvent> {
        Ok(match self {
            EventKind::TrackStart => NodeEvent::TrackStart(frame.parse()?),
            EventKind::TrackEnd => NodeEvent::TrackEnd(frame.parse()?),
            EventKind::TrackException => NodeEvent::TrackException(frame.parse()?),
            EventKind::TrackStuck => NodeEvent::TrackStuck(frame.parse()?),
            EventKind::WebsocketClosed => NodeEvent::WebsocketClosed(frame.parse()?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStart {
    #[serde(deserialize_with = "deserialize_guild_id")]
    pub guild_id: u64,
    /// Encoded track identifier
    pub track: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEnd {
    #[serde(deserialize_with = "deserialize_guild_id")]
    pub guild_id: u64,
    pub track: String,
    /// `FINISHED`, `LOAD_FAILED`, `STOPPED`, `REPLACED` or `CLEANUP`
    pub reason: String,
}

impl TrackEnd {
    /// Whether the player should move on to the next queued track.
    pub fn may_start_next(&self) -> bool {
        matches!(self.reason.as_str(), "FINISHED" | "LOAD_FAILED")
    }
}

/// Structured exception body sent by newer nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfo {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackException {
    #[serde(deserialize_with = "deserialize_guild_id")]
    pub guild_id: u64,
    pub track: String,
    /// Plain error string sent by older nodes
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub exception: Option<ExceptionInfo>,
}

impl TrackException {
    pub fn message(&self) -> &str {
        self.error
            .as_deref()
            .or_else(|| self.exception.as_ref().and_then(|e| e.message.as_deref()))
            .unwrap_or("unknown error")
    }

    pub fn severity(&self) -> Option<&str> {
        self.exception.as_ref().and_then(|e| e.severity.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStuck {
    #[serde(deserialize_with = "deserialize_guild_id")]
    pub guild_id: u64,
    pub track: String,
    pub threshold_ms: u64,
}

/// The voice WebSocket between the node and the chat platform closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsocketClosed {
    #[serde(deserialize_with = "deserialize_guild_id")]
    pub guild_id: u64,
    pub code: u16,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub by_remote: bool,
}

/// A typed event, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum NodeEvent {
    TrackStart(TrackStart),
    TrackEnd(TrackEnd),
    TrackException(TrackException),
    TrackStuck(TrackStuck),
    WebsocketClosed(WebsocketClosed),
}

impl NodeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            NodeEvent::TrackStart(_) => EventKind::TrackStart,
            NodeEvent::TrackEnd(_) => EventKind::TrackEnd,
            NodeEvent::TrackException(_) => EventKind::TrackException,
            NodeEvent::TrackStuck(_) => EventKind::TrackStuck,
            NodeEvent::WebsocketClosed(_) => EventKind::WebsocketClosed,
        }
    }

    pub fn guild_id(&self) -> u64 {
        match self {
            NodeEvent::TrackStart(e) => e.guild_id,
            NodeEvent::TrackEnd(e) => e.guild_id,
            NodeEvent::TrackException(e) => e.guild_id,
            NodeEvent::TrackStuck(e) => e.guild_id,
            NodeEvent::WebsocketClosed(e) => e.guild_id,
        }
    }
}

/// Position report carried by `playerUpdate` frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Node clock when the report was made, epoch milliseconds
    pub time: i64,
    /// Track position in milliseconds; absent when nothing is playing
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub connected: Option<bool>,
    /// Voice gateway round trip in milliseconds, -1 when unknown
    #[serde(default)]
    pub ping: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(deserialize_with = "deserialize_guild_id")]
    pub guild_id: u64,
    pub state: PlayerState,
}
