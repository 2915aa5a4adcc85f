//! Monotonic clock source
//!
//! Every timer in the pipeline (grace period, cooldowns, mode switches) is
//! expressed as a `Duration` since the clock's start. The worker samples the
//! clock once per frame and hands the same value to every stage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic time
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock started
    fn now(&self) -> Duration;
}

/// Wall clock backed by `Instant`
#[derive(Clone)]
pub struct MonotonicClock {
    start_instant: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start_instant: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start_instant.elapsed()
    }
}

/// Manually advanced clock for deterministic tests and replays
///
/// Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `delta`
    pub fn advance(&self, delta: Duration) {
        self.now_us
            .fetch_add(delta.as_micros() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute time (never moves backwards)
    pub fn set(&self, at: Duration) {
        self.now_us.fetch_max(at.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.now_us.load(Ordering::SeqCst))
    }
}

/// Convert a configured number of seconds into a `Duration`
///
/// Rounded to whole microseconds so that configured values like `0.6`
/// compare exactly against clock readings. Negative or non-finite values
/// clamp to zero; validation rejects them before they get here.
pub fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_micros((value * 1_000_000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}
