//! Freshness, retry and polling policies.

use std::time::Duration;

use crate::clock::EpochMillis;

/// Exponential backoff for transient failures.
///
/// Only errors that report [`is_retryable`](crate::provider::ProviderError::is_retryable)
/// are retried; rate limits and configuration errors surface immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Never retry.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };

    /// Retry `max_retries` times, doubling from one second up to 30 seconds.
    pub fn times(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// How a query treats cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    /// How long fetched data counts as fresh. `None` means forever: the
    /// query only refetches when invalidated or explicitly refetched.
    pub stale_time: Option<Duration>,
    pub retry: RetryPolicy,
    /// Background refetch period while the query handle is alive.
    pub refetch_interval: Option<Duration>,
}

impl QueryPolicy {
    /// Fresh for five minutes, one retry.
    pub fn nearby_transit() -> Self {
        Self {
            stale_time: Some(Duration::from_secs(5 * 60)),
            retry: RetryPolicy::times(1),
            refetch_interval: None,
        }
    }

    /// Cached until invalidated.
    pub fn route_details() -> Self {
        Self {
            stale_time: None,
            retry: RetryPolicy::times(1),
            refetch_interval: None,
        }
    }

    /// Polled every 30 seconds.
    pub fn vehicles() -> Self {
        Self {
            stale_time: Some(Duration::ZERO),
            retry: RetryPolicy::NONE,
            refetch_interval: Some(Duration::from_secs(30)),
        }
    }

    /// Fetched on every request, never polled.
    pub fn on_demand() -> Self {
        Self {
            stale_time: Some(Duration::ZERO),
            retry: RetryPolicy::NONE,
            refetch_interval: None,
        }
    }

    pub fn with_stale_time(mut self, stale_time: Option<Duration>) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_refetch_interval(mut self, interval: Option<Duration>) -> Self {
        self.refetch_interval = interval;
        self
    }

    /// Whether data fetched at `fetched_at` is still fresh at `now`.
    pub fn is_fresh(&self, fetched_at: EpochMillis, now: EpochMillis) -> bool {
        match self.stale_time {
            None => true,
            Some(stale_time) if stale_time.is_zero() => false,
            Some(stale_time) => now - fetched_at < stale_time.as_millis() as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryPolicy::times(10);
        assert_eq!(retry.delay_for(0), Duration::from_secs(1));
        assert_eq!(retry.delay_for(1), Duration::from_secs(2));
        assert_eq!(retry.delay_for(4), Duration::from_secs(16));
        assert_eq!(retry.delay_for(5), Duration::from_secs(30));
        assert_eq!(retry.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn test_freshness() {
        let nearby = QueryPolicy::nearby_transit();
        assert!(nearby.is_fresh(0, 299_999));
        assert!(!nearby.is_fresh(0, 300_000));

        assert!(QueryPolicy::route_details().is_fresh(0, i64::MAX));
        assert!(!QueryPolicy::on_demand().is_fresh(0, 0));
    }

    #[test]
    fn test_presets() {
        assert_eq!(
            QueryPolicy::vehicles().refetch_interval,
            Some(Duration::from_secs(30))
        );
        assert_eq!(QueryPolicy::nearby_transit().retry.max_retries, 1);
        assert_eq!(QueryPolicy::on_demand().refetch_interval, None);
    }
}
