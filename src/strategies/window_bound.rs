//! Fixed-window limiter bound to one service's published quota.
//!
//! Services that document their limits as "N requests per window" (rather
//! than a continuous rate) get a matching fixed-window throttler: a budget
//! that is spent within the window and restored in full when the window
//! rolls over. The full budget is stored separately from the running
//! remainder so a rollover always restores the whole quota.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::trace;

use crate::error::{Result, ThrottleError};

/// One service's published window quota.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowLimit {
    /// Requests allowed per window.
    pub limit: f64,
    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl WindowLimit {
    pub fn new(limit: f64, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Table of window quotas for the services a client talks to.
pub type ServiceLimits = HashMap<String, WindowLimit>;

/// A fixed-window throttler for a single service.
#[derive(Debug, Clone)]
pub struct WindowBoundThrottler {
    /// The full per-window budget; never mutated after construction.
    limit: f64,
    remaining: f64,
    window: Duration,
    window_start: Instant,
}

impl WindowBoundThrottler {
    /// Create a throttler with a full budget and a window starting now.
    ///
    /// Refuses a non-positive or non-finite limit and a zero window.
    pub fn new(limit: f64, window: Duration) -> Result<Self> {
        if !(limit.is_finite() && limit > 0.0) {
            return Err(ThrottleError::Validation(format!(
                "window limit must be positive and finite, got {limit}"
            )));
        }
        if window.is_zero() {
            return Err(ThrottleError::Validation(
                "window length must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            limit,
            remaining: limit,
            window,
            window_start: Instant::now(),
        })
    }

    /// Create a throttler for a known service from a limits table.
    pub fn for_service(limits: &ServiceLimits, service: &str) -> Result<Self> {
        match limits.get(service) {
            Some(entry) => Self::new(entry.limit, entry.window),
            None => Err(ThrottleError::Validation(format!(
                "no window limit configured for service '{service}'"
            ))),
        }
    }

    /// Spend `cost` from the current window, suspending over a window
    /// boundary if the budget is exhausted.
    ///
    /// # Panics
    ///
    /// Panics on a negative or non-finite cost.
    pub async fn throttle(&mut self, cost: f64) {
        assert!(
            cost.is_finite() && cost >= 0.0,
            "window cost must be finite and nonnegative, got {cost}"
        );
        let now = Instant::now();

        // Roll the window over if it has already elapsed.
        if now.saturating_duration_since(self.window_start) > self.window {
            self.remaining = self.limit;
            self.window_start = now;
        }

        if self.remaining <= 0.0 {
            let into_window = now.saturating_duration_since(self.window_start);
            let wait = self.window.saturating_sub(into_window);
            trace!(wait_ms = wait.as_millis() as u64, "window budget spent, waiting for rollover");
            tokio::time::sleep(wait).await;
            self.remaining = self.limit;
            self.window_start = Instant::now();
        }

        self.remaining -= cost;
    }

    /// Budget left in the current window. Can be negative when the final
    /// request of a window cost more than what remained.
    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    /// The full per-window budget.
    pub fn limit(&self) -> f64 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_parameters() {
        assert!(WindowBoundThrottler::new(0.0, Duration::from_secs(1)).is_err());
        assert!(WindowBoundThrottler::new(30.0, Duration::ZERO).is_err());
    }

    #[test]
    fn for_service_consults_the_table() {
        let mut limits = ServiceLimits::new();
        limits.insert(
            "orders-api".to_string(),
            WindowLimit::new(30.0, Duration::from_secs(1)),
        );

        let throttler = WindowBoundThrottler::for_service(&limits, "orders-api").unwrap();
        assert_eq!(throttler.limit(), 30.0);
        assert!(WindowBoundThrottler::for_service(&limits, "quotes-api").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn spends_within_the_window_without_waiting() {
        let mut throttler = WindowBoundThrottler::new(5.0, Duration::from_secs(60)).unwrap();
        let start = Instant::now();
        for _ in 0..5 {
            throttler.throttle(1.0).await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));
        assert_eq!(throttler.remaining(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_waits_for_rollover_and_restores_full_limit() {
        let mut throttler = WindowBoundThrottler::new(3.0, Duration::from_secs(10)).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            throttler.throttle(1.0).await;
        }

        // Fourth call spans the boundary and draws on a fresh budget.
        throttler.throttle(1.0).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_millis(10_200));
        assert_eq!(throttler.remaining(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_rollover_resets_the_budget() {
        let mut throttler = WindowBoundThrottler::new(2.0, Duration::from_secs(1)).unwrap();
        throttler.throttle(2.0).await;
        assert_eq!(throttler.remaining(), 0.0);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let start = Instant::now();
        throttler.throttle(1.0).await;
        assert!(start.elapsed() < Duration::from_millis(10));
        assert_eq!(throttler.remaining(), 1.0);
    }
}
