//! Backoff policy for reconnect attempts.
//!
//! The first delay after a successful open is jittered in `[min, 2 * min)` so
//! that many clients dropped by the same outage do not reconnect in lockstep.
//! Every following delay grows geometrically from the previous one and is
//! clamped to the maximum. Only the first delay is jittered.

use rand::Rng;
use std::time::Duration;

/// Computes reconnect delays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    min_delay: Duration,
    max_delay: Duration,
    grow_factor: f64,
}

impl BackoffPolicy {
    /// Creates a policy.
    ///
    /// `grow_factor` is expected to be finite and greater than 1; the config
    /// builder rejects anything else before a policy is built.
    pub fn new(min_delay: Duration, max_delay: Duration, grow_factor: f64) -> Self {
        Self {
            min_delay,
            max_delay,
            grow_factor,
        }
    }

    /// Returns the minimum (pre-jitter) delay.
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Returns the delay ceiling.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Returns the growth factor.
    pub fn grow_factor(&self) -> f64 {
        self.grow_factor
    }

    /// Returns a jittered first delay in `[min, 2 * min)`.
    pub fn initial_delay(&self) -> Duration {
        let sample: f64 = rand::rng().random_range(0.0..1.0);
        self.initial_delay_from(sample)
    }

    /// Returns `min + sample * min` for a `sample` in `[0, 1)`.
    ///
    /// Samples outside that range are clamped into it.
    pub fn initial_delay_from(&self, sample: f64) -> Duration {
        let sample = if sample.is_nan() {
            0.0
        } else {
            sample.clamp(0.0, 1.0)
        };
        let min_nanos = self.min_delay.as_nanos();
        // Truncate, and stay strictly below 2 * min even for a sample of 1.0.
        let jitter = ((min_nanos as f64 * sample) as u128).min(min_nanos.saturating_sub(1));
        self.min_delay
            .saturating_add(Duration::from_nanos(u64::try_from(jitter).unwrap_or(u64::MAX)))
    }

    /// Returns `min(previous * grow_factor, max)`.
    pub fn next_delay(&self, previous: Duration) -> Duration {
        let grown = previous.as_nanos() as f64 * self.grow_factor;
        let ceiling = self.max_delay.as_nanos() as f64;
        if !grown.is_finite() || grown >= ceiling || grown >= u64::MAX as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(grown.max(0.0).round() as u64)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500), Duration::from_secs(10), 1.3)
    }
}
