//! # Reconnect policy.
//!
//! [`ReconnectPolicy`] decides how a supervisor retries after losing its connection:
//! how long to wait between attempts ([`BackoffPolicy`]) and whether to give up
//! after a bounded number of attempts.
//!
//! ```text
//! attempt 1 ── fail ──► sleep backoff.next(0) ──► attempt 2 ── fail ──► sleep backoff.next(1) ...
//!                                                                  │
//!            max_attempts = Some(n) and attempt == n  ─────────────┴──► Degraded (wait for rearm)
//!            max_attempts = None                      ───────────────► keep trying
//! ```
//!
//! Attempt counting restarts from zero on every successful reconnect and on
//! [`Supervisor::rearm`](crate::Supervisor::rearm).

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Retry rules applied while a supervisor is reconnecting.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReconnectPolicy {
    /// Delay computation between failed attempts.
    pub backoff: BackoffPolicy,
    /// Maximum attempts per reconnect cycle (`None` = retry forever).
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Retry forever with the given backoff.
    pub fn unbounded(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            max_attempts: None,
        }
    }

    /// Give up after `attempts` failures in one cycle.
    ///
    /// `attempts` is clamped to at least 1.
    pub fn bounded(backoff: BackoffPolicy, attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: Some(attempts.max(1)),
        }
    }

    /// Returns `true` if `failed` attempts exhaust this policy.
    pub fn is_exhausted(&self, failed: u32) -> bool {
        self.max_attempts.is_some_and(|max| failed >= max)
    }

    /// Delay to wait after the `failed`-th failure (1-based).
    pub fn delay_after(&self, failed: u32) -> Duration {
        self.backoff.next(failed.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_never_exhausts() {
        let policy = ReconnectPolicy::unbounded(BackoffPolicy::constant(Duration::from_secs(1)));
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(u32::MAX));
    }

    #[test]
    fn test_bounded_exhausts_at_limit() {
        let policy = ReconnectPolicy::bounded(BackoffPolicy::constant(Duration::from_secs(1)), 3);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn test_bounded_zero_is_clamped() {
        let policy = ReconnectPolicy::bounded(BackoffPolicy::default(), 0);
        assert_eq!(policy.max_attempts, Some(1));
    }

    #[test]
    fn test_delay_follows_backoff() {
        let policy = ReconnectPolicy::unbounded(BackoffPolicy::exponential(
            Duration::from_millis(100),
            Duration::from_secs(10),
        ));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }
}
