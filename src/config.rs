use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, ThrottleError};

/// Configuration for the multi-rule throttler.
///
/// Both fields have conservative defaults; most callers only ever touch
/// `max_capacity` when they expect large request bursts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiThrottlerConfig {
    /// Hard cap on the admission queue length. Submissions beyond this
    /// fail with [`ThrottleError::QueueFull`].
    pub max_capacity: usize,
    /// Upper bound on how long the driver sleeps between polls of the
    /// queue head.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for MultiThrottlerConfig {
    fn default() -> Self {
        Self {
            max_capacity: 2000,
            delay: Duration::from_millis(1),
        }
    }
}

impl MultiThrottlerConfig {
    /// Create a config with an explicit queue cap and poll delay.
    pub fn new(max_capacity: usize, delay: Duration) -> Self {
        Self {
            max_capacity,
            delay,
        }
    }

    /// Validate config parameters.
    pub fn validate(&self) -> Result<()> {
        if self.max_capacity == 0 {
            return Err(ThrottleError::Validation(
                "max_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
