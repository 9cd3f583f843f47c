//! # Player Sessions
//!
//! The player layer (queues, voice state, playback) lives outside this crate.
//! This module is the seam: the trait the dispatcher drives, and the per-node
//! map that resolves a frame's `guildId` to the session it belongs to.
//!
//! ## Lookup Misses:
//! A frame for a guild with no session is normal: the player may have been
//! destroyed while the node still had a trailing event in flight. The
//! dispatcher drops such frames without touching any other session.

use crate::protocol::{PlayerState, PlayerUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One guild's playback context, owned by the player layer.
#[async_trait]
pub trait PlayerSession: Send + Sync {
    fn guild_id(&self) -> u64;

    /// Apply a `playerUpdate` report. Errors are the session's own business;
    /// the dispatcher passes them back up without handling them.
    async fn update_state(&self, update: PlayerUpdate) -> anyhow::Result<()>;
}

impl fmt::Debug for dyn PlayerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerSession")
            .field("guild_id", &self.guild_id())
            .finish()
    }
}

/// Sessions of one node, keyed by guild id.
#[derive(Default)]
pub struct SessionMap {
    sessions: RwLock<HashMap<u64, Arc<dyn PlayerSession>>>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing any previous one for the same guild.
    pub async fn insert(&self, session: Arc<dyn PlayerSession>) -> Option<Arc<dyn PlayerSession>> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.guild_id(), session)
    }

    pub async fn get(&self, guild_id: u64) -> Option<Arc<dyn PlayerSession>> {
        self.sessions.read().await.get(&guild_id).cloned()
    }

    pub async fn remove(&self, guild_id: u64) -> Option<Arc<dyn PlayerSession>> {
        self.sessions.write().await.remove(&guild_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn guild_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.sessions.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Minimal session that just remembers the last position the node reported.
///
/// Useful for hosts that only want the event stream and for tests.
pub struct TrackedPlayer {
    guild_id: u64,
    state: RwLock<Option<TrackedState>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedState {
    pub state: PlayerState,
    pub updated_at: DateTime<Utc>,
}

impl TrackedPlayer {
    pub fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            state: RwLock::new(None),
        }
    }

    pub async fn last_state(&self) -> Option<TrackedState> {
        self.state.read().await.clone()
    }

    /// Last reported position in milliseconds.
    pub async fn position(&self) -> Option<i64> {
        self.state
            .read()
            .await
            .as_ref()
            .and_then(|tracked| tracked.state.position)
    }
}

#[async_trait]
impl PlayerSession for TrackedPlayer {
    fn guild_id(&self) -> u64 {
        self.guild_id
    }

    async fn update_state(&self, update: PlayerUpdate) -> anyhow::Result<()> {
        if update.guild_id != self.guild_id {
            return Err(anyhow::anyhow!(
                "update for guild {} delivered to session {}",
                update.guild_id,
                self.guild_id
            ));
        }

        *self.state.write().await = Some(TrackedState {
            state: update.state,
            updated_at: Utc::now(),
        });
        Ok(())
    }
}
