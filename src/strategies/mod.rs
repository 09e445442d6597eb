//! Single-bucket throttling strategies
//!
//! This module collects the alternative throttlers a caller can configure
//! instead of the multi-rule scheduler: a fixed inter-request delay, a
//! suspending token bucket, an adaptive backoff driven by request
//! outcomes, and a fixed-window limiter.
//!
//! None of these strategies share state with each other or guard against
//! concurrent callers; each instance paces one logical caller.

pub mod adaptive;
pub mod fixed_delay;
pub mod window_bound;

// Re-export the token bucket from the crate root
pub use crate::token_bucket::BucketThrottler;
pub use adaptive::AdaptiveThrottler;
pub use fixed_delay::FixedDelayThrottler;
pub use window_bound::{ServiceLimits, WindowBoundThrottler, WindowLimit};
