//! Adaptive backoff driven by request outcomes.
//!
//! The caller reports each request's outcome through [`on_success`] and
//! [`on_error`]; the delay shrinks after a run of successes and grows
//! after repeated errors, always staying within `[base_delay, max_delay]`.
//!
//! [`on_success`]: AdaptiveThrottler::on_success
//! [`on_error`]: AdaptiveThrottler::on_error

use std::time::Duration;

use tracing::debug;

use crate::error::{Result, ThrottleError};

/// Number of consecutive successes before the delay is relaxed.
const SUCCESSES_PER_RELAX: u32 = 10;
/// Number of errors before the delay is tightened.
const ERRORS_PER_TIGHTEN: u32 = 3;
/// Multiplier applied when relaxing the delay.
const RELAX_FACTOR: f64 = 0.9;
/// Multiplier applied when tightening the delay.
const TIGHTEN_FACTOR: f64 = 1.5;

/// A throttler whose delay adapts to how the remote service is behaving.
///
/// `throttle` itself just sleeps the current delay; adjustment happens
/// only through the outcome callbacks, whenever the caller chooses to
/// invoke them.
#[derive(Debug, Clone)]
pub struct AdaptiveThrottler {
    base_delay: Duration,
    max_delay: Duration,
    current_delay: Duration,
    success_count: u32,
    error_count: u32,
}

impl AdaptiveThrottler {
    /// Create an adaptive throttler starting at `base_delay`.
    ///
    /// Refuses a base delay longer than the maximum.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Result<Self> {
        if base_delay > max_delay {
            return Err(ThrottleError::Validation(format!(
                "base_delay ({base_delay:?}) must not exceed max_delay ({max_delay:?})"
            )));
        }
        Ok(Self {
            base_delay,
            max_delay,
            current_delay: base_delay,
            success_count: 0,
            error_count: 0,
        })
    }

    /// Suspend for the current delay.
    pub async fn throttle(&self) {
        tokio::time::sleep(self.current_delay).await;
    }

    /// Report a successful request.
    ///
    /// Every tenth consecutive report relaxes the delay by 10%, floored at
    /// `base_delay`, and restarts the count.
    pub fn on_success(&mut self) {
        self.success_count += 1;
        if self.success_count >= SUCCESSES_PER_RELAX {
            let relaxed = self.current_delay.mul_f64(RELAX_FACTOR);
            self.current_delay = relaxed.max(self.base_delay);
            self.success_count = 0;
            debug!(delay_ms = self.current_delay.as_millis() as u64, "delay relaxed");
        }
    }

    /// Report a failed request.
    ///
    /// Every third report tightens the delay by 50%, capped at
    /// `max_delay`, and restarts the count.
    pub fn on_error(&mut self) {
        self.error_count += 1;
        if self.error_count >= ERRORS_PER_TIGHTEN {
            let tightened = self.current_delay.mul_f64(TIGHTEN_FACTOR);
            self.current_delay = tightened.min(self.max_delay);
            self.error_count = 0;
            debug!(delay_ms = self.current_delay.as_millis() as u64, "delay tightened");
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttler() -> AdaptiveThrottler {
        AdaptiveThrottler::new(Duration::from_millis(100), Duration::from_millis(2000)).unwrap()
    }

    #[test]
    fn rejects_base_above_max() {
        assert!(
            AdaptiveThrottler::new(Duration::from_secs(5), Duration::from_secs(1)).is_err()
        );
    }

    #[test]
    fn ten_successes_relax_the_delay() {
        let mut adaptive = throttler();
        // Push the delay up first so there is room to relax.
        for _ in 0..3 {
            adaptive.on_error();
        }
        assert_eq!(adaptive.current_delay(), Duration::from_millis(150));

        for _ in 0..9 {
            adaptive.on_success();
        }
        assert_eq!(adaptive.current_delay(), Duration::from_millis(150));
        adaptive.on_success();
        assert_eq!(adaptive.current_delay(), Duration::from_millis(135));
    }

    #[test]
    fn relaxing_never_undershoots_base() {
        let mut adaptive = throttler();
        for _ in 0..50 {
            adaptive.on_success();
        }
        assert_eq!(adaptive.current_delay(), Duration::from_millis(100));
    }

    #[test]
    fn three_errors_tighten_up_to_max() {
        let mut adaptive = throttler();
        for _ in 0..30 {
            adaptive.on_error();
        }
        assert_eq!(adaptive.current_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn error_counter_restarts_after_adjustment() {
        let mut adaptive = throttler();
        for _ in 0..4 {
            adaptive.on_error();
        }
        // Only the third error adjusted; the fourth starts a new run.
        assert_eq!(adaptive.current_delay(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_sleeps_current_delay() {
        let adaptive = throttler();
        let start = tokio::time::Instant::now();
        adaptive.throttle().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(start.elapsed() < Duration::from_millis(150));
    }
}
