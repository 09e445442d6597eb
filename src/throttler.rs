//! # Throttler Façade
//!
//! One configured pacing mechanism per client instance, behind a uniform
//! `throttle(cost)` call.
//!
//! ## Mechanism Selection
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          Throttler                             │
//! ├────────────────────────────────────────────────────────────────┤
//! │                                                                │
//! │  throttle(cost) ──────────┬──▶ FixedDelay   (scalar, ignored)  │
//! │                           ├──▶ Bucket       (scalar)           │
//! │                           ├──▶ Adaptive     (scalar, ignored)  │
//! │                           ├──▶ WindowBound  (scalar)           │
//! │                           └──▶ Multi        (cost vector)      │
//! │                                                                │
//! │  throttle_blocking(cost) ────▶ Sync         (scalar)           │
//! │                                                                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cost Shapes
//!
//! | Mechanism   | Accepts              | On mismatch                    |
//! |-------------|----------------------|--------------------------------|
//! | single-bucket strategies | `Unit`, `Weight` | `Validation`        |
//! | `Multi`     | `Rules`              | `Validation`, unless the       |
//! |             |                      | scalar-to-`default` opt-in is  |
//! |             |                      | set and a `default` rule exists|
//! | `Sync`      | `Unit`, `Weight` via the blocking call | `Validation` |
//!
//! Routing a scalar cost to the multi-rule scheduler is never implicit:
//! the caller must opt in with [`Throttler::allow_scalar_to_default`],
//! and the coerced `{default: cost}` vector still fails with
//! `UnknownRule` if no `default` rule is registered.

use std::time::Duration;

use crate::cost::CostVector;
use crate::error::{Result, ThrottleError};
use crate::multi_throttler::MultiThrottler;
use crate::strategies::{
    AdaptiveThrottler, BucketThrottler, FixedDelayThrottler, WindowBoundThrottler, WindowLimit,
};
use crate::sync_throttler::SyncThrottler;

/// Rule id targeted by opted-in scalar coercion on a multi-rule throttler.
pub const DEFAULT_RULE: &str = "default";

/// The cost of one request, in whichever shape the configured mechanism
/// understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Cost {
    /// A plain request: scalar cost of one.
    Unit,
    /// A weighted request against a single budget.
    Weight(f64),
    /// Per-rule costs against a multi-rule throttler.
    Rules(CostVector),
}

impl Default for Cost {
    fn default() -> Self {
        Cost::Unit
    }
}

impl From<f64> for Cost {
    fn from(weight: f64) -> Self {
        Cost::Weight(weight)
    }
}

impl From<CostVector> for Cost {
    fn from(rules: CostVector) -> Self {
        Cost::Rules(rules)
    }
}

enum Mechanism {
    FixedDelay(FixedDelayThrottler),
    Bucket(BucketThrottler),
    Adaptive(AdaptiveThrottler),
    WindowBound(WindowBoundThrottler),
    Multi(MultiThrottler),
    Sync(SyncThrottler),
}

/// A client-facing throttler configured with exactly one mechanism.
///
/// # Example
///
/// ```rust,no_run
/// use ratekeeper::throttler::{Cost, Throttler};
///
/// # async fn example() -> ratekeeper::Result<()> {
/// let mut throttler = Throttler::bucket(10.0, 2.0)?;
/// throttler.throttle(Cost::Unit).await?;
/// throttler.throttle(Cost::Weight(3.0)).await?;
/// # Ok(())
/// # }
/// ```
pub struct Throttler {
    mechanism: Mechanism,
    coerce_scalar_to_default: bool,
}

impl Throttler {
    /// Fixed inter-request delay.
    pub fn fixed_delay(delay: Duration) -> Self {
        Self::wrap(Mechanism::FixedDelay(FixedDelayThrottler::new(delay)))
    }

    /// Suspending token bucket (`refill_rate` in tokens per second).
    pub fn bucket(capacity: f64, refill_rate: f64) -> Result<Self> {
        Ok(Self::wrap(Mechanism::Bucket(BucketThrottler::new(
            capacity,
            refill_rate,
        )?)))
    }

    /// Outcome-driven adaptive backoff.
    pub fn adaptive(base_delay: Duration, max_delay: Duration) -> Result<Self> {
        Ok(Self::wrap(Mechanism::Adaptive(AdaptiveThrottler::new(
            base_delay, max_delay,
        )?)))
    }

    /// Fixed-window limiter for one service's published quota.
    pub fn window_bound(limit: WindowLimit) -> Result<Self> {
        Ok(Self::wrap(Mechanism::WindowBound(WindowBoundThrottler::new(
            limit.limit,
            limit.window,
        )?)))
    }

    /// Multi-rule token-bucket scheduler.
    pub fn multi(throttler: MultiThrottler) -> Self {
        Self::wrap(Mechanism::Multi(throttler))
    }

    /// Blocking minimum-interval gate, driven through
    /// [`throttle_blocking`](Self::throttle_blocking).
    pub fn sync_gate(rate_limit: Duration) -> Self {
        Self::wrap(Mechanism::Sync(SyncThrottler::new(rate_limit)))
    }

    /// Opt in to routing scalar costs on a multi-rule throttler through
    /// its `default` rule as `{default: cost}`.
    pub fn allow_scalar_to_default(mut self) -> Self {
        self.coerce_scalar_to_default = true;
        self
    }

    fn wrap(mechanism: Mechanism) -> Self {
        Self {
            mechanism,
            coerce_scalar_to_default: false,
        }
    }

    /// Pace one request through the configured async mechanism.
    pub async fn throttle(&mut self, cost: Cost) -> Result<()> {
        match &mut self.mechanism {
            Mechanism::FixedDelay(throttler) => {
                scalar_cost(cost)?;
                throttler.throttle().await;
                Ok(())
            }
            Mechanism::Bucket(throttler) => {
                let weight = scalar_cost(cost)?;
                throttler.throttle(weight).await;
                Ok(())
            }
            Mechanism::Adaptive(throttler) => {
                scalar_cost(cost)?;
                throttler.throttle().await;
                Ok(())
            }
            Mechanism::WindowBound(throttler) => {
                let weight = scalar_cost(cost)?;
                throttler.throttle(weight).await;
                Ok(())
            }
            Mechanism::Multi(throttler) => {
                let vector = match cost {
                    Cost::Rules(vector) => vector,
                    scalar if self.coerce_scalar_to_default => {
                        let weight = scalar_cost(scalar)?;
                        CostVector::from([(DEFAULT_RULE, weight)])
                    }
                    _ => {
                        return Err(ThrottleError::Validation(
                            "multi-rule throttler takes a cost vector; scalar costs require \
                             the explicit default-rule opt-in"
                                .to_string(),
                        ))
                    }
                };
                throttler.throttle(vector)?.await
            }
            Mechanism::Sync(_) => Err(ThrottleError::Validation(
                "blocking gate must be driven through throttle_blocking".to_string(),
            )),
        }
    }

    /// Pace one request through the blocking gate.
    pub fn throttle_blocking(&self, cost: Cost) -> Result<()> {
        match &self.mechanism {
            Mechanism::Sync(gate) => {
                gate.throttle(scalar_cost(cost)?);
                Ok(())
            }
            _ => Err(ThrottleError::Validation(
                "configured mechanism is asynchronous; use throttle".to_string(),
            )),
        }
    }

    /// The adaptive strategy's outcome callbacks, if this instance is
    /// configured with one.
    pub fn as_adaptive_mut(&mut self) -> Option<&mut AdaptiveThrottler> {
        match &mut self.mechanism {
            Mechanism::Adaptive(throttler) => Some(throttler),
            _ => None,
        }
    }

    /// The underlying multi-rule throttler, if configured.
    pub fn as_multi(&self) -> Option<&MultiThrottler> {
        match &self.mechanism {
            Mechanism::Multi(throttler) => Some(throttler),
            _ => None,
        }
    }
}

fn scalar_cost(cost: Cost) -> Result<f64> {
    match cost {
        Cost::Unit => Ok(1.0),
        Cost::Weight(weight) => {
            assert!(
                weight.is_finite() && weight >= 0.0,
                "cost weight must be finite and nonnegative, got {weight}"
            );
            Ok(weight)
        }
        Cost::Rules(_) => Err(ThrottleError::Validation(
            "this mechanism takes a scalar cost, not a cost vector".to_string(),
        )),
    }
}
