//! Throttle rules: the per-bucket records the multi-rule throttler enforces.
//!
//! A rule is one token bucket: a capacity, a continuous refill rate in
//! tokens per millisecond, and the current balance. The interval fields are
//! descriptive only (they record how the operator thinks of the limit, e.g.
//! "1200 per MINUTE") and are never consulted by the admission algorithm.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThrottleError};

/// How a rule's limit was originally phrased, for logs and dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntervalType {
    Second,
    Minute,
    Hour,
    Day,
}

/// A single rate-limiting rule (one token bucket).
///
/// # Example
///
/// ```rust
/// use ratekeeper::rule::{IntervalType, ThrottleRule};
///
/// // 1200 request-weight units per minute, i.e. 0.02 tokens/ms
/// let rule = ThrottleRule::new("weight", 1200.0, 0.02)
///     .with_interval(IntervalType::Minute, 1)
///     .with_description("request weight budget");
/// assert_eq!(rule.tokens, 1200.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleRule {
    /// Unique identifier within one throttler.
    pub id: String,
    /// Maximum tokens the bucket can hold.
    pub capacity: f64,
    /// Tokens added per millisecond.
    pub refill_rate: f64,
    /// Current available tokens, always within `[0, capacity]`.
    pub tokens: f64,
    /// Descriptive interval unit, not consulted by the algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_type: Option<IntervalType>,
    /// Descriptive interval count, not consulted by the algorithm.
    #[serde(default = "default_interval_num")]
    pub interval_num: u32,
    /// Free-form note about what this rule limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_interval_num() -> u32 {
    1
}

impl ThrottleRule {
    /// Create a rule that starts with a full bucket.
    pub fn new(id: impl Into<String>, capacity: f64, refill_rate: f64) -> Self {
        Self {
            id: id.into(),
            capacity,
            refill_rate,
            tokens: capacity,
            interval_type: None,
            interval_num: 1,
            description: None,
        }
    }

    /// Override the starting token balance.
    pub fn with_tokens(mut self, tokens: f64) -> Self {
        self.tokens = tokens;
        self
    }

    /// Attach the descriptive interval the limit was phrased in.
    pub fn with_interval(mut self, interval_type: IntervalType, interval_num: u32) -> Self {
        self.interval_type = Some(interval_type);
        self.interval_num = interval_num;
        self
    }

    /// Attach a free-form description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validate numeric preconditions.
    ///
    /// Refuses empty ids, non-positive or non-finite capacity and refill
    /// rate, and a starting balance outside `[0, capacity]`.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(ThrottleError::Validation(
                "rule id must not be empty".to_string(),
            ));
        }
        if !(self.capacity.is_finite() && self.capacity > 0.0) {
            return Err(ThrottleError::Validation(format!(
                "rule '{}': capacity must be positive and finite, got {}",
                self.id, self.capacity
            )));
        }
        if !(self.refill_rate.is_finite() && self.refill_rate > 0.0) {
            return Err(ThrottleError::Validation(format!(
                "rule '{}': refill_rate must be positive and finite, got {}",
                self.id, self.refill_rate
            )));
        }
        if !(self.tokens.is_finite() && (0.0..=self.capacity).contains(&self.tokens)) {
            return Err(ThrottleError::Validation(format!(
                "rule '{}': tokens must lie in [0, {}], got {}",
                self.id, self.capacity, self.tokens
            )));
        }
        Ok(())
    }

    /// Current bucket state for `status()` snapshots.
    pub fn status(&self) -> RuleStatus {
        RuleStatus {
            tokens: self.tokens,
            capacity: self.capacity,
            utilization: 1.0 - self.tokens / self.capacity,
        }
    }
}

/// Point-in-time view of one rule's bucket.
///
/// `utilization` runs from `0.0` (full bucket) to `1.0` (empty bucket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleStatus {
    pub tokens: f64,
    pub capacity: f64,
    pub utilization: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rule_starts_full() {
        let rule = ThrottleRule::new("weight", 100.0, 0.02);
        assert_eq!(rule.tokens, 100.0);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn rejects_nonpositive_capacity() {
        assert!(ThrottleRule::new("w", 0.0, 0.02).validate().is_err());
        assert!(ThrottleRule::new("w", -5.0, 0.02).validate().is_err());
        assert!(ThrottleRule::new("w", f64::NAN, 0.02).validate().is_err());
    }

    #[test]
    fn rejects_tokens_outside_capacity() {
        let rule = ThrottleRule::new("w", 10.0, 0.01).with_tokens(11.0);
        assert!(rule.validate().is_err());
        let rule = ThrottleRule::new("w", 10.0, 0.01).with_tokens(-1.0);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn status_reports_utilization() {
        let rule = ThrottleRule::new("w", 10.0, 0.01).with_tokens(2.5);
        let status = rule.status();
        assert_eq!(status.tokens, 2.5);
        assert_eq!(status.capacity, 10.0);
        assert!((status.utilization - 0.75).abs() < 1e-12);
    }

    #[test]
    fn serde_round_trip() {
        let rule = ThrottleRule::new("orders", 50.0, 0.005)
            .with_interval(IntervalType::Second, 10)
            .with_description("order placement budget");
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"SECOND\""));
        let back: ThrottleRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "orders");
        assert_eq!(back.capacity, 50.0);
        assert_eq!(back.interval_num, 10);
    }
}
