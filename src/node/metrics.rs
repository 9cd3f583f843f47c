//! # Node Metrics
//!
//! Counters collected by one node's connection manager, pump and dispatcher.
//!
//! ## Dropped Frames:
//! Frames for guilds without a session and events of an unknown type are
//! never surfaced as errors. They are counted here and logged at debug level.
//!
//! ## Thread Safety:
//! Every counter is an `AtomicU64`; the pump and any number of dispatch tasks
//! bump them concurrently without a lock. `Relaxed` ordering is enough since
//! the values are only ever read as a snapshot for reporting.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct NodeMetrics {
    frames_received: AtomicU64,
    decode_failures: AtomicU64,
    dropped_unknown_session: AtomicU64,
    unknown_events: AtomicU64,
    subscriber_failures: AtomicU64,
    connect_attempts: AtomicU64,
    reconnect_attempts: AtomicU64,
}

/// Point-in-time copy of the counters, for health reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeMetricsSnapshot {
    pub frames_received: u64,
    pub decode_failures: u64,
    pub dropped_unknown_session: u64,
    pub unknown_events: u64,
    pub subscriber_failures: u64,
    pub connect_attempts: u64,
    pub reconnect_attempts: u64,
}

impl NodeMetrics {
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_session(&self) {
        self.dropped_unknown_session.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_event(&self) {
        self.unknown_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscriber_failure(&self) {
        self.subscriber_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> NodeMetricsSnapshot {
        NodeMetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            dropped_unknown_session: self.dropped_unknown_session.load(Ordering::Relaxed),
            unknown_events: self.unknown_events.load(Ordering::Relaxed),
            subscriber_failures: self.subscriber_failures.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

impl NodeMetricsSnapshot {
    /// Share of received frames that were thrown away for any reason.
    pub fn drop_rate(&self) -> f64 {
        if self.frames_received > 0 {
            let dropped = self.decode_failures + self.dropped_unknown_session + self.unknown_events;
            dropped as f64 / self.frames_received as f64
        } else {
            0.0
        }
    }
}
