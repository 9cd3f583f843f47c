//! # Reconnect Backoff
//!
//! Produces the delay the reconnect cycle sleeps before each new handshake.
//!
//! ## Delay Formula:
//! `min(max_delay, base * 2^min(attempt, max_exponent))`, optionally plus up to
//! `jitter * delay` of random noise. A delay is never smaller than the one
//! handed out before it, jitter included, until `reset()` is called.

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential delay generator owned by one node's connection manager.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_exponent: u32,
    max_delay: Duration,
    jitter: f64,
    /// Number of delays handed out since the last reset
    exponent: u32,
    /// Last delay handed out, the floor for the next one
    last: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max_exponent: u32, max_delay: Duration) -> Self {
        Self {
            base,
            max_exponent,
            max_delay: max_delay.max(base),
            jitter: 0.0,
            exponent: 0,
            last: Duration::ZERO,
        }
    }

    /// Add up to `fraction` of each delay as random noise (clamped to 0.0..=1.0).
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_ms),
            config.max_exponent,
            Duration::from_millis(config.max_delay_ms),
        )
        .with_jitter(config.jitter)
    }

    /// Delay to wait before the next reconnect attempt.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.exponent.min(self.max_exponent).min(31);
        self.exponent = self.exponent.saturating_add(1);

        let factor = 1u32 << exponent;
        let mut delay = self
            .base
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if self.jitter > 0.0 {
            let spread = delay.as_secs_f64() * self.jitter;
            let noise = rand::thread_rng().gen_range(0.0..=spread);
            delay = (delay + Duration::from_secs_f64(noise)).min(self.max_delay);
        }

        delay = delay.max(self.last);
        self.last = delay;
        delay
    }

    /// Start over from the minimum delay. Called once per successful handshake.
    pub fn reset(&mut self) {
        self.exponent = 0;
        self.last = Duration::ZERO;
    }

    /// Delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.exponent
    }

    /// The delay a fresh generator would return first.
    pub fn minimum(&self) -> Duration {
        self.base.min(self.max_delay)
    }
}
