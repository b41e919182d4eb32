//! [`AdmissionLimiter`]: per-client sliding-log request counter.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;

use super::clock::Clock;

type ClientLog = HashMap<String, VecDeque<Duration>>;

/// Default number of requests admitted per client per window.
pub const DEFAULT_MAX_REQUESTS: usize = 60;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Process-wide admission filter shared by every route.
///
/// Each client owns an ordered log of the instants at which it was admitted.
/// On every check the log is pruned of entries that have left the window, and
/// the request is admitted only if fewer than `max_requests` entries remain.
///
/// The whole prune-count-record sequence runs under one [`Mutex`]; that lock is
/// the only critical section. Timestamps are supplied by the caller so the
/// limiter itself never reads a clock.
#[derive(Clone, Debug)]
pub struct AdmissionLimiter {
    max_requests: usize,
    window: Duration,
    log: Arc<Mutex<ClientLog>>,
}

impl AdmissionLimiter {
    /// Create a limiter admitting `max_requests` per `window` per client.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            log: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether `client_id` may proceed at time `now`.
    ///
    /// A timestamp `t` still counts while `now - t < window`; every older
    /// entry is pruned, wherever it sits in the log. A denied request is not
    /// recorded.
    pub fn allow(&self, client_id: &str, now: Duration) -> bool {
        let mut log = self.log.lock();
        self.admit(&mut log, client_id, now)
    }

    /// Like [`AdmissionLimiter::allow`], but reads `clock` inside the critical
    /// section, so concurrent callers record their timestamps in lock order.
    pub fn allow_now(&self, client_id: &str, clock: &dyn Clock) -> bool {
        let mut log = self.log.lock();
        let now = clock.now();
        self.admit(&mut log, client_id, now)
    }

    fn admit(&self, log: &mut ClientLog, client_id: &str, now: Duration) -> bool {
        let entries = log.entry(client_id.to_owned()).or_default();
        entries.retain(|&t| now.saturating_sub(t) < self.window);

        if entries.len() >= self.max_requests {
            return false;
        }
        entries.push_back(now);
        true
    }

    /// Drop every client with no timestamps left inside the window at `now`.
    ///
    /// Returns the number of clients removed. Never called unless a sweep
    /// interval is configured; by default the map only grows.
    pub fn sweep_idle(&self, now: Duration) -> usize {
        let mut log = self.log.lock();
        let before = log.len();
        log.retain(|_, entries| {
            entries
                .iter()
                .any(|&t| now.saturating_sub(t) < self.window)
        });
        before - log.len()
    }

    /// Number of clients currently held in memory.
    pub fn tracked_clients(&self) -> usize {
        self.log.lock().len()
    }
}

impl Default for AdmissionLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}
