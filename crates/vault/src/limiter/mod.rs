//! Per-client admission control consulted before any request is handled.
//!
//! # Behaviour
//!
//! 1. Every inbound request is keyed by the peer IP address.
//! 2. [`AdmissionLimiter::allow`] prunes that client's log and either records
//!    the request or denies it; denied requests get `429` and nothing else runs.
//! 3. State is in memory only. A restart forgets every client.
//!
//! Idle clients are kept forever unless `WISS_RATE_LIMIT_SWEEP_INTERVAL_SECS` is
//! set, in which case [`sweep_task`] periodically drops clients whose whole
//! log has aged out.

pub mod clock;
pub mod window;

pub use clock::{Clock, MonotonicClock};
pub use window::AdmissionLimiter;

use std::{sync::Arc, time::Duration};

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Spawn a background task that sweeps idle clients every `interval`.
///
/// The first sweep fires after one full interval. The task exits when
/// `shutdown` is cancelled.
pub fn sweep_task(
    limiter: AdmissionLimiter,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // First tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = limiter.sweep_idle(clock.now());
                    debug!(removed, remaining = limiter.tracked_clients(), "swept idle clients");
                }
            }
        }
    })
}
