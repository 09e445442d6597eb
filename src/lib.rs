//! # Ratekeeper - A Request-Rate Throttling Engine
//!
//! Ratekeeper paces outgoing requests from clients of rate-limited APIs.
//! It coordinates calls against per-service quotas while preserving FIFO
//! fairness and bounded memory, entirely in-process.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────────┐     ┌─────────────┐
//! │   Caller    │────▶│    Throttler (façade)    │────▶│   Remote    │
//! │  (client)   │     │                          │     │  Services   │
//! └─────────────┘     └──────────────────────────┘     └─────────────┘
//!                                  │
//!                  ┌───────────┬───┴────────┬──────────────┐
//!                  ▼           ▼            ▼              ▼
//!           ┌────────────┐ ┌────────┐ ┌──────────┐ ┌─────────────┐
//!           │   Multi    │ │ Token  │ │ Adaptive │ │  Blocking   │
//!           │ Throttler  │ │ Bucket │ │ /Window  │ │    Gate     │
//!           └────────────┘ └────────┘ └──────────┘ └─────────────┘
//! ```
//!
//! ## Core Components
//!
//! - **[`MultiThrottler`]** - Multi-rule token-bucket scheduler with a
//!   FIFO admission queue and a self-stopping driver task
//! - **[`Throttler`]** - Façade that forwards `throttle(cost)` to the one
//!   mechanism an instance was configured with
//! - **Strategies** - Pluggable single-bucket throttlers:
//!   [`FixedDelayThrottler`], [`BucketThrottler`], [`AdaptiveThrottler`],
//!   [`WindowBoundThrottler`]
//! - **[`SyncThrottler`]** - Blocking minimum-interval gate for
//!   synchronous callers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ratekeeper::{CostVector, MultiThrottler, ThrottleRule};
//!
//! #[tokio::main]
//! async fn main() -> ratekeeper::Result<()> {
//!     // Two simultaneously binding budgets, Binance-style.
//!     let throttler = MultiThrottler::new(&[
//!         ThrottleRule::new("weight", 1200.0, 0.02),
//!         ThrottleRule::new("orders", 50.0, 0.005),
//!     ])?;
//!
//!     // Resolves once both budgets can cover the request.
//!     throttler
//!         .throttle(CostVector::from([("weight", 5.0), ("orders", 1.0)]))?
//!         .await?;
//!
//!     // issue the request here
//!     Ok(())
//! }
//! ```
//!
//! ## Choosing a Mechanism
//!
//! | Mechanism       | Use Case                                        |
//! |-----------------|-------------------------------------------------|
//! | `MultiThrottler`| Several quotas bind at once (weight + orders)   |
//! | `BucketThrottler`| One continuous-rate budget with bursts         |
//! | `FixedDelay`    | Documented "one request per N ms" policies      |
//! | `Adaptive`      | Undocumented limits, feel out the service       |
//! | `WindowBound`   | Published "N requests per window" quotas        |
//! | `SyncThrottler` | Blocking clients without an async runtime       |
//!
//! ## Module Organization
//!
//! - [`config`] - Multi-throttler configuration
//! - [`cost`] - Per-rule cost vectors
//! - [`error`] - Error types shared by all mechanisms
//! - [`multi_throttler`] - The multi-rule scheduling engine
//! - [`rule`] - Throttle rules and status snapshots
//! - [`strategies`] - Pluggable single-bucket strategies
//! - [`sync_throttler`] - Blocking minimum-interval gate
//! - [`throttler`] - Mechanism façade
//! - [`token_bucket`] - Suspending token-bucket strategy

pub mod config;
pub mod cost;
pub mod error;
pub mod multi_throttler;
pub mod rule;
pub mod strategies;
pub mod sync_throttler;
pub mod throttler;
pub mod token_bucket;

// Re-export commonly used types
pub use config::MultiThrottlerConfig;
pub use cost::CostVector;
pub use error::ThrottleError;
pub use multi_throttler::{Admission, MultiThrottler};
pub use rule::{IntervalType, RuleStatus, ThrottleRule};
pub use strategies::{
    AdaptiveThrottler, BucketThrottler, FixedDelayThrottler, ServiceLimits, WindowBoundThrottler,
    WindowLimit,
};
pub use sync_throttler::SyncThrottler;
pub use throttler::{Cost, Throttler, DEFAULT_RULE};

/// Result type alias for throttling operations
pub type Result<T> = std::result::Result<T, ThrottleError>;

/// Version of the ratekeeper library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
