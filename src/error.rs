//! # Error Types
//!
//! This module defines the error type shared by every throttling mechanism
//! in the crate.
//!
//! ## Error Classification
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  ThrottleError Variant   │  Raised by            │  Recoverable?    │
//! │  ────────────────────────┼───────────────────────┼──────────────────│
//! │  UnknownRule             │  throttle entry,      │  no, fix the     │
//! │                          │  admission check      │  cost vector     │
//! │  QueueFull               │  throttle entry       │  retry later     │
//! │  Validation              │  construction,        │  no, fix the     │
//! │                          │  façade dispatch      │  caller          │
//! │  Internal                │  poisoned lock,       │  no              │
//! │                          │  torn-down driver     │                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only `UnknownRule` and `QueueFull` are part of normal operation. The
//! other two indicate a misconfigured or misused throttler and are refused
//! rather than silently normalized.

use thiserror::Error;

/// Error type for all throttling operations.
///
/// `UnknownRule` and `QueueFull` carry enough context for a caller to log a
/// useful message without reaching back into the throttler.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ThrottleError {
    /// A cost vector referenced a rule id that is not in the rule table.
    ///
    /// Raised synchronously by `throttle` before anything is enqueued, and
    /// by the admission check if a referenced rule was removed while the
    /// request was queued (which drains the whole queue with this error).
    #[error("Unknown throttle rule: {id}. Available rules: {}", .known.join(", "))]
    UnknownRule {
        /// The offending rule id.
        id: String,
        /// Rule ids that were registered at the time of the call.
        known: Vec<String>,
    },

    /// The admission queue is at its configured capacity.
    #[error("throttle queue is over maxCapacity ({max_capacity})")]
    QueueFull {
        /// The configured queue-length cap.
        max_capacity: usize,
    },

    /// A precondition was violated at construction or dispatch time.
    #[error("validation error: {0}")]
    Validation(String),

    /// Lock poisoning or a driver that went away mid-request.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for throttling operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_rule_lists_known_ids() {
        let err = ThrottleError::UnknownRule {
            id: "orders".to_string(),
            known: vec!["weight".to_string(), "raw".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Unknown throttle rule: orders"));
        assert!(msg.contains("weight, raw"));
    }

    #[test]
    fn queue_full_carries_cap() {
        let err = ThrottleError::QueueFull { max_capacity: 2000 };
        assert_eq!(
            err.to_string(),
            "throttle queue is over maxCapacity (2000)"
        );
    }
}
