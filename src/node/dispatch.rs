//! # Frame Dispatcher
//!
//! Routes one decoded frame by its `op` field:
//! - **stats**: replace the node's statistics snapshot, emit nothing
//! - **event**: resolve the guild's session, translate the event type through
//!   the fixed table and emit the typed event tagged with node and session
//! - **playerUpdate**: resolve the guild's session and hand it the update
//! - anything else: ignored
//!
//! Session misses and unknown event types are dropped silently (counted,
//! logged at debug). Subscriber failures are absorbed by `emit_guarded`.
//! A session's own `update_state` error is returned to the caller untouched.

use crate::error::{NodeError, NodeResult};
use crate::node::Node;
use crate::notify::{emit_guarded, EventSink, Notification};
use crate::protocol::{EventKind, Frame, Op, PlayerUpdate, Stats};
use std::sync::Arc;
use tracing::{debug, trace};

/// What the dispatcher did with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    StatsUpdated,
    Emitted(EventKind),
    StateForwarded { guild_id: u64 },
    /// No session for the frame's guild (or no usable guild id at all)
    UnknownSession { guild_id: Option<u64> },
    /// Event type missing from the table
    UnknownEvent(String),
    /// Missing or unrecognised `op`
    Ignored,
}

pub struct Dispatcher {
    node: Arc<Node>,
    sink: Arc<dyn EventSink>,
}

impl Dispatcher {
    pub fn new(node: Arc<Node>, sink: Arc<dyn EventSink>) -> Self {
        Self { node, sink }
    }

    pub async fn process(&self, frame: Frame) -> NodeResult<Dispatch> {
        match frame.op() {
            Some(Op::Stats) => self.process_stats(&frame).await,
            Some(Op::Event) => self.process_event(&frame).await,
            Some(Op::PlayerUpdate) => self.process_player_update(&frame).await,
            Some(Op::Other(op)) => {
                trace!(node = %self.node.identifier(), op = %op, "Ignoring frame with unhandled op");
                Ok(Dispatch::Ignored)
            }
            None => {
                trace!(node = %self.node.identifier(), "Ignoring frame without op");
                Ok(Dispatch::Ignored)
            }
        }
    }

    async fn process_stats(&self, frame: &Frame) -> NodeResult<Dispatch> {
        let stats: Stats = self.decode(frame.parse())?;
        trace!(
            node = %self.node.identifier(),
            players = stats.players,
            playing = stats.playing_players,
            "Statistics updated"
        );
        self.node.replace_stats(stats).await;
        Ok(Dispatch::StatsUpdated)
    }

    async fn process_event(&self, frame: &Frame) -> NodeResult<Dispatch> {
        let guild_id = frame.guild_id();
        let session = match guild_id {
            Some(id) => self.node.sessions().get(id).await,
            None => None,
        };
        let Some(session) = session else {
            return Ok(self.unknown_session(guild_id, "event"));
        };

        let name = frame.str_field("type").unwrap_or_default();
        let Some(kind) = EventKind::from_wire(name) else {
            self.node.metrics().record_unknown_event();
            debug!(
                node = %self.node.identifier(),
                event_type = %name,
                "Dropping event of unknown type"
            );
            return Ok(Dispatch::UnknownEvent(name.to_string()));
        };

        let event = self.decode(kind.decode(frame))?;
        debug!(node = %self.node.identifier(), event = ?event, "op: event");

        emit_guarded(
            self.sink.as_ref(),
            Notification::Event {
                node: Arc::clone(&self.node),
                session,
                event,
            },
        );
        Ok(Dispatch::Emitted(kind))
    }

    async fn process_player_update(&self, frame: &Frame) -> NodeResult<Dispatch> {
        let guild_id = frame.guild_id();
        let session = match guild_id {
            Some(id) => self.node.sessions().get(id).await,
            None => None,
        };
        let Some(session) = session else {
            return Ok(self.unknown_session(guild_id, "playerUpdate"));
        };

        let update: PlayerUpdate = self.decode(frame.parse())?;
        let guild_id = update.guild_id;
        debug!(node = %self.node.identifier(), update = ?update, "op: playerUpdate");

        session
            .update_state(update)
            .await
            .map_err(|err| NodeError::SessionUpdate {
                guild_id,
                message: format!("{:#}", err),
            })?;
        Ok(Dispatch::StateForwarded { guild_id })
    }

    fn unknown_session(&self, guild_id: Option<u64>, op: &str) -> Dispatch {
        self.node.metrics().record_unknown_session();
        debug!(
            node = %self.node.identifier(),
            guild_id = ?guild_id,
            op = op,
            "No session for frame; dropping"
        );
        Dispatch::UnknownSession { guild_id }
    }

    fn decode<T>(&self, result: NodeResult<T>) -> NodeResult<T> {
        if result.is_err() {
            self.node.metrics().record_decode_failure();
        }
        result
    }
}
