//! Host readiness signal.
//!
//! The host process (the bot) has to be fully initialized before any node
//! handshake; otherwise the node would learn a user id the bot cannot yet act
//! on. `connect()` waits on this signal with a timeout.
//!
//! ## Rust Concepts:
//! - **watch channel**: keeps only the latest value, so a late subscriber sees
//!   `true` immediately instead of waiting for a message it already missed
//! - **Arc<watch::Sender>**: every clone of `Readiness` marks the same latch
//! - **Borrow scope**: `wait_for` returns a guard borrowing the receiver, so the
//!   guard is turned into `()` inside the future before the receiver is dropped

use crate::error::{NodeError, NodeResult};  // Timeout surfaces as ReadinessTimeout
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;                     // Latest-value channel

/// Cloneable latch: once marked ready it stays ready.
#[derive(Debug, Clone)]
pub struct Readiness {
    tx: Arc<watch::Sender<bool>>,
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// A signal that is already satisfied, for hosts with nothing to wait on.
    pub fn ready() -> Self {
        let readiness = Self::new();
        readiness.mark_ready();
        readiness
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Suspend until the host is ready, or fail after `timeout`.
    pub async fn wait(&self, timeout: Duration) -> NodeResult<()> {
        let mut rx = self.tx.subscribe();
        let ready = async { rx.wait_for(|ready| *ready).await.map(|_| ()) };
        let outcome = match tokio::time::timeout(timeout, ready).await {
            Ok(Ok(())) => Ok(()),
            // The sender lives as long as `self`, so the channel cannot close here
            Ok(Err(_)) => Err(NodeError::Transport("readiness channel closed".to_string())),
            Err(_) => Err(NodeError::ReadinessTimeout {
                waited_ms: timeout.as_millis() as u64,
            }),
        };
        outcome
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}
