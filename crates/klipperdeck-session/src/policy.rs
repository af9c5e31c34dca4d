//! Connect retry policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do once the connect budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Enter simulation after the grace delay.
    #[default]
    Simulate,
    /// Stay in the failed state.
    Stay,
}

/// Bounded retries for the initial connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next.
    pub retry_delay: Duration,
    /// Pause between the last failure and the fallback.
    pub fallback_delay: Duration,
    pub fallback: Fallback,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_secs(3),
            fallback_delay: Duration::from_secs(2),
            fallback: Fallback::Simulate,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt may follow attempt number `attempt`.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_attempts_by_default() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
        assert_eq!(policy.fallback, Fallback::Simulate);
    }

    #[test]
    fn fallback_names() {
        let stay: Fallback = serde_json::from_str("\"stay\"").unwrap();
        assert_eq!(stay, Fallback::Stay);
    }
}
