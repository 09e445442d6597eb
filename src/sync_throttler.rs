//! # Blocking Minimum-Interval Gate
//!
//! Synchronous clients that issue one request at a time do not want an
//! admission queue; they want each request to start no sooner than
//! `rate_limit · cost` after the previous one, even when several threads
//! share the client. This module provides that gate.
//!
//! The whole check-sleep-stamp sequence runs under one mutex. Releasing
//! the lock before sleeping would let two threads both observe "enough
//! time elapsed" and fire simultaneously; holding it is what serializes
//! them `rate_limit` apart.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

/// A blocking gate that enforces a minimum interval between requests.
///
/// Safe to share across threads; concurrent callers are released one at a
/// time, spaced `rate_limit · cost` apart. The first call ever is free.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use ratekeeper::sync_throttler::SyncThrottler;
///
/// let gate = SyncThrottler::new(Duration::from_millis(200));
/// gate.throttle(1.0); // immediate
/// gate.throttle(1.0); // blocks ~200ms
/// gate.throttle(2.0); // blocks ~400ms
/// ```
#[derive(Debug)]
pub struct SyncThrottler {
    rate_limit: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl SyncThrottler {
    /// Create a gate with the given minimum interval per unit of cost.
    pub fn new(rate_limit: Duration) -> Self {
        Self {
            rate_limit,
            last_request: Mutex::new(None),
        }
    }

    /// Block until at least `rate_limit · cost` has passed since the
    /// previous request, then stamp the current time.
    ///
    /// # Panics
    ///
    /// Panics on a negative or non-finite cost.
    pub fn throttle(&self, cost: f64) {
        assert!(
            cost.is_finite() && cost >= 0.0,
            "gate cost must be finite and nonnegative, got {cost}"
        );
        // The stored timestamp is always valid, so a poisoned lock is
        // recovered rather than propagated.
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = *last {
            let required = self.rate_limit.mul_f64(cost);
            let elapsed = previous.elapsed();
            if elapsed < required {
                let pause = required - elapsed;
                trace!(pause_ms = pause.as_millis() as u64, "gating request");
                thread::sleep(pause);
            }
        }
        *last = Some(Instant::now());
    }

    pub fn rate_limit(&self) -> Duration {
        self.rate_limit
    }
}
