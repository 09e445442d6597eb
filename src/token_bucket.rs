//! # Token Bucket Strategy
//!
//! A single-bucket throttler that suspends the caller instead of denying
//! the request: tokens refill continuously, and a request that cannot be
//! covered right now sleeps exactly long enough for the deficit to refill.
//!
//! ## How It Works
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │   Bucket over time (capacity=10, refill_rate=2/sec):               │
//! │                                                                    │
//! │   t=0.0s  [██████████] 10/10   throttle(4) → proceeds at once      │
//! │   t=0.0s  [██████    ]  6/10   throttle(6) → proceeds at once      │
//! │   t=0.0s  [          ]  0/10   throttle(4) → sleeps 2s             │
//! │   t=2.0s  [          ]  0/10   ← deficit refilled and spent        │
//! │   t=3.5s  [███       ]  3/10   refill continues while idle         │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unlike the deny-style buckets used by server-side limiters, this
//! strategy never rejects: every call eventually proceeds, which is what a
//! client issuing its own outbound requests wants.
//!
//! ## Key Properties
//!
//! | Property       | Description                                    |
//! |----------------|------------------------------------------------|
//! | **Capacity**   | Maximum tokens (burst size)                    |
//! | **Refill Rate**| Tokens added per second (sustained rate)       |
//! | **Precision**  | `f64` balance, fractional refill carries over  |
//! | **Sharing**    | Not internally synchronized; one caller only   |

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::error::{Result, ThrottleError};

/// A suspending token-bucket throttler for a single budget.
///
/// # Example
///
/// ```rust,no_run
/// use ratekeeper::token_bucket::BucketThrottler;
///
/// # async fn example() -> ratekeeper::Result<()> {
/// // 10-token burst, sustained 2 requests per second
/// let mut bucket = BucketThrottler::new(10.0, 2.0)?;
///
/// for _ in 0..25 {
///     bucket.throttle(1.0).await; // sleeps once the burst is spent
///     // issue the request here
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BucketThrottler {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl BucketThrottler {
    /// Create a bucket that starts full.
    ///
    /// `refill_rate` is in tokens per second. Refuses non-positive or
    /// non-finite parameters.
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self> {
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(ThrottleError::Validation(format!(
                "bucket capacity must be positive and finite, got {capacity}"
            )));
        }
        if !(refill_rate.is_finite() && refill_rate > 0.0) {
            return Err(ThrottleError::Validation(format!(
                "bucket refill_rate must be positive and finite, got {refill_rate}"
            )));
        }
        Ok(Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: Instant::now(),
        })
    }

    /// Override the starting balance, clamped into `[0, capacity]`.
    pub fn with_tokens(mut self, tokens: f64) -> Self {
        self.tokens = tokens.clamp(0.0, self.capacity);
        self
    }

    /// Wait until the bucket can cover `cost`, then spend it.
    ///
    /// If the balance already covers the cost this returns without
    /// suspending. Otherwise it sleeps for exactly the deficit divided by
    /// the refill rate, after which the balance is fully spent (zero).
    ///
    /// # Panics
    ///
    /// Panics on a negative or non-finite cost.
    pub async fn throttle(&mut self, cost: f64) {
        assert!(
            cost.is_finite() && cost >= 0.0,
            "bucket cost must be finite and nonnegative, got {cost}"
        );
        self.refill();
        if self.tokens >= cost {
            self.tokens -= cost;
            return;
        }
        let wait = Duration::from_secs_f64((cost - self.tokens) / self.refill_rate);
        trace!(wait_ms = wait.as_millis() as u64, "bucket exhausted, sleeping");
        tokio::time::sleep(wait).await;
        self.tokens = 0.0;
    }

    /// Spend `cost` only if the bucket can cover it right now.
    ///
    /// Returns whether the tokens were consumed. Never suspends.
    pub fn try_consume(&mut self, cost: f64) -> bool {
        self.refill();
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Time until `cost` tokens will be available, `Duration::ZERO` if
    /// they already are.
    pub fn time_until_available(&mut self, cost: f64) -> Duration {
        self.refill();
        if self.tokens >= cost {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((cost - self.tokens) / self.refill_rate)
    }

    /// Restore the bucket to full capacity.
    pub fn reset(&mut self) {
        self.tokens = self.capacity;
        self.last_refill = Instant::now();
    }

    /// Current balance after a refresh.
    pub fn remaining(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    /// Bucket utilization from `0.0` (full) to `1.0` (empty).
    pub fn utilization(&mut self) -> f64 {
        self.refill();
        1.0 - self.tokens / self.capacity
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        if elapsed > 0.0 {
            self.tokens = (self.tokens + self.refill_rate * elapsed).min(self.capacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_bucket_starts_full() {
        let mut bucket = BucketThrottler::new(100.0, 10.0).unwrap();
        assert_eq!(bucket.remaining(), 100.0);
    }

    #[tokio::test]
    async fn rejects_bad_parameters() {
        assert!(BucketThrottler::new(0.0, 10.0).is_err());
        assert!(BucketThrottler::new(10.0, -1.0).is_err());
        assert!(BucketThrottler::new(f64::INFINITY, 1.0).is_err());
    }

    #[tokio::test]
    async fn try_consume_spends_and_denies() {
        let mut bucket = BucketThrottler::new(10.0, 1.0).unwrap();
        assert!(bucket.try_consume(6.0));
        assert!(bucket.try_consume(4.0));
        assert!(!bucket.try_consume(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_then_paced_waits() {
        let mut bucket = BucketThrottler::new(4.0, 2.0).unwrap();
        let start = Instant::now();

        bucket.throttle(4.0).await;
        assert!(start.elapsed() < Duration::from_millis(10));

        // Deficit of 3 tokens at 2/sec: 1.5 seconds.
        bucket.throttle(3.0).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1490));
        assert!(elapsed < Duration::from_millis(1600));

        // The wait spends the whole balance.
        assert!(bucket.remaining() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn refills_while_idle() {
        let mut bucket = BucketThrottler::new(10.0, 2.0).unwrap().with_tokens(0.0);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!((bucket.remaining() - 6.0).abs() < 0.1);
        assert!((bucket.utilization() - 0.4).abs() < 0.02);
    }

    #[tokio::test(start_paused = true)]
    async fn time_until_available_reports_deficit() {
        let mut bucket = BucketThrottler::new(10.0, 2.0).unwrap().with_tokens(0.0);
        let wait = bucket.time_until_available(4.0);
        assert!((wait.as_secs_f64() - 2.0).abs() < 0.05);

        bucket.reset();
        assert_eq!(bucket.time_until_available(4.0), Duration::ZERO);
    }
}
