//! Retry policy for remote writes.

use crate::WriteErrorKind;
use serde::{Deserialize, Serialize};

/// Exponential backoff between write attempts.
///
/// Attempts are numbered from 1. After attempt `n` fails the next one is
/// delayed by `base_delay_ms * multiplier^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay_ms: u64,
    /// Growth factor applied to each subsequent delay
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Create a doubling policy.
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            multiplier: 2,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, 0)
    }

    /// Delay to wait after attempt `attempt` fails.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1);
        let factor = u64::from(self.multiplier)
            .checked_pow(exponent)
            .unwrap_or(u64::MAX);
        self.base_delay_ms.saturating_mul(factor)
    }

    /// Whether a failure of `attempt` with `kind` warrants another attempt.
    pub fn should_retry(&self, attempt: u32, kind: WriteErrorKind) -> bool {
        attempt < self.max_attempts && kind.is_retryable()
    }

    /// Sum of every backoff delay when all attempts fail.
    pub fn total_backoff(&self) -> u64 {
        (1..self.max_attempts)
            .map(|attempt| self.delay_for(attempt))
            .fold(0u64, u64::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 1000);
    }

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), 1000);
        assert_eq!(policy.delay_for(2), 2000);
        assert_eq!(policy.delay_for(3), 4000);
    }

    #[test]
    fn delay_saturates() {
        let policy = RetryPolicy::new(100, u64::MAX / 2);
        assert_eq!(policy.delay_for(80), u64::MAX);
    }

    #[test]
    fn should_retry_respects_attempts_and_kind() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1, WriteErrorKind::ConnectionLost));
        assert!(policy.should_retry(2, WriteErrorKind::Other));
        assert!(!policy.should_retry(3, WriteErrorKind::ConnectionLost));
        assert!(!policy.should_retry(1, WriteErrorKind::PermissionDenied));
        assert!(!policy.should_retry(1, WriteErrorKind::InvalidId));
    }

    #[test]
    fn total_backoff_sums_waits_between_attempts() {
        assert_eq!(RetryPolicy::default().total_backoff(), 3000);
        assert_eq!(RetryPolicy::new(4, 1000).total_backoff(), 7000);
        assert_eq!(RetryPolicy::no_retry().total_backoff(), 0);
    }

    #[test]
    fn new_clamps_to_one_attempt() {
        assert_eq!(RetryPolicy::new(0, 10).max_attempts, 1);
    }

    #[test]
    fn serialization_format() {
        let json = serde_json::to_string(&RetryPolicy::default()).unwrap();
        assert!(json.contains("maxAttempts"));
        assert!(json.contains("baseDelayMs"));
    }
}
