//! # Nodes
//!
//! A node is one remote audio-processing endpoint. This module holds the
//! node's shared state and the machinery that keeps a session with it alive:
//! - **client**: connection manager (handshake, availability, reconnect cycle)
//! - **pump**: the receive loop bound to the live connection
//! - **dispatch**: routes decoded frames to statistics, sessions and subscribers
//! - **backoff**: reconnect delay generator
//! - **metrics**: per-node counters
//!
//! ## Ownership:
//! `Node` is shared (`Arc<Node>`) between the connection manager, the
//! dispatcher, notifications and the host. The live connection itself is
//! never shared; only the connection manager and its pump touch it.

pub mod backoff;
pub mod client;
pub mod dispatch;
pub mod metrics;
mod pump;

use crate::config::NodeConfig;
use crate::protocol::{Penalty, Stats};
use crate::session::SessionMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

pub use backoff::ExponentialBackoff;
pub use client::{ClientSettings, NodeClient};
pub use dispatch::{Dispatch, Dispatcher};
pub use metrics::{NodeMetrics, NodeMetricsSnapshot};

pub struct Node {
    config: NodeConfig,
    resume_key: String,
    shard_count: u32,
    /// Toggled on handshake success and on connection loss
    available: AtomicBool,
    /// Latest `stats` snapshot, replaced wholesale on every stats frame
    stats: RwLock<Option<Stats>>,
    sessions: SessionMap,
    metrics: NodeMetrics,
}

impl Node {
    /// Create an unavailable node. A resume key is generated when the
    /// configuration does not fix one.
    pub fn new(config: NodeConfig, shard_count: u32) -> Self {
        let resume_key = config
            .resume_key
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            config,
            resume_key,
            shard_count,
            available: AtomicBool::new(false),
            stats: RwLock::new(None),
            sessions: SessionMap::new(),
            metrics: NodeMetrics::default(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.config.identifier
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn uri(&self) -> String {
        self.config.uri()
    }

    pub fn resume_key(&self) -> &str {
        &self.resume_key
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    pub fn region(&self) -> Option<&str> {
        self.config.region.as_deref()
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Latest statistics snapshot, `None` until the first stats frame.
    pub async fn stats(&self) -> Option<Stats> {
        self.stats.read().await.clone()
    }

    pub(crate) async fn replace_stats(&self, stats: Stats) {
        *self.stats.write().await = Some(stats);
    }

    /// Load penalty from the latest snapshot; nodes without one score zero.
    pub async fn penalty(&self) -> f64 {
        self.stats
            .read()
            .await
            .as_ref()
            .map(|stats| stats.penalty().total)
            .unwrap_or(0.0)
    }

    pub async fn penalty_breakdown(&self) -> Option<Penalty> {
        self.stats.read().await.as_ref().map(Stats::penalty)
    }

    pub fn sessions(&self) -> &SessionMap {
        &self.sessions
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("identifier", &self.config.identifier)
            .field("uri", &self.config.uri())
            .field("region", &self.config.region)
            .field("available", &self.is_available())
            .finish()
    }
}
