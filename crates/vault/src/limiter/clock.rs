//! Time sources for the admission limiter.

use std::{fmt::Debug, time::Duration};

use tokio::time::Instant;

/// Source of "now" for admission decisions.
///
/// Readings are offsets from an arbitrary, fixed origin. Only differences
/// between readings are meaningful.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Duration;
}

/// Monotonic clock anchored at construction time.
///
/// Wall-clock adjustments cannot move it backwards, so a client's window never
/// stretches or shrinks because NTP stepped the system time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
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
        self.origin.elapsed()
    }
}

/// Manually advanced clock for deterministic tests.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: std::sync::Arc<parking_lot::Mutex<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}
