//! Outbound request guards.
//!
//! [`RateLimiter`] bounds how many calls may start within a sliding window.
//! It never queues: when the window is full, [`rate_limited_request`] fails
//! fast with [`RateLimitError::Exceeded`] and the caller decides whether to
//! retry. [`Debouncer`] coalesces bursts of calls (keystroke-driven search)
//! into one call after a quiet period.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use slymaps::rate_limit::{rate_limited_request, RateLimitConfig, RateLimiter};
//!
//! let limiter = RateLimiter::new(RateLimitConfig::default(), slymaps::clock::system_clock());
//! let body = rate_limited_request(&limiter, || client.get(url)).await?;
//! ```

mod debounce;

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::clock::{EpochMillis, SharedClock};

pub use debounce::Debouncer;

/// Default number of requests allowed per window.
pub const DEFAULT_MAX_REQUESTS: usize = 10;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Rate limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Raised when the window is full.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded. Please try again in {} seconds.", retry_after_secs(.retry_after_ms))]
    Exceeded { retry_after_ms: u64 },
}

impl RateLimitError {
    pub fn retry_after(&self) -> Duration {
        match self {
            RateLimitError::Exceeded { retry_after_ms } => Duration::from_millis(*retry_after_ms),
        }
    }
}

fn retry_after_secs(ms: &u64) -> u64 {
    ms.div_ceil(1000).max(1)
}

/// Sliding-window request counter.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: SharedClock,
    requests: Mutex<VecDeque<EpochMillis>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("recorded", &self.requests.lock().len())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            requests: Mutex::new(VecDeque::with_capacity(config.max_requests)),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    fn window_ms(&self) -> i64 {
        self.config.window.as_millis() as i64
    }

    /// Drop timestamps that have left the window.
    fn prune(&self, requests: &mut VecDeque<EpochMillis>, now: EpochMillis) {
        let window = self.window_ms();
        while let Some(&oldest) = requests.front() {
            if now - oldest >= window {
                requests.pop_front();
            } else {
                break;
            }
        }
    }

    /// True when fewer than `max_requests` calls fall inside the window.
    pub fn can_make_request(&self) -> bool {
        let now = self.clock.now_ms();
        let mut requests = self.requests.lock();
        self.prune(&mut requests, now);
        requests.len() < self.config.max_requests
    }

    /// Record a call made now.
    pub fn record_request(&self) {
        let now = self.clock.now_ms();
        self.requests.lock().push_back(now);
    }

    /// Milliseconds until the oldest recorded call leaves the window, or 0
    /// when under the limit.
    pub fn time_until_reset(&self) -> u64 {
        let now = self.clock.now_ms();
        let mut requests = self.requests.lock();
        self.prune(&mut requests, now);

        if requests.len() < self.config.max_requests {
            return 0;
        }
        requests
            .front()
            .map(|oldest| (oldest + self.window_ms() - now).max(0) as u64)
            .unwrap_or(0)
    }

    /// Check and record in one step.
    pub fn try_acquire(&self) -> Result<(), RateLimitError> {
        let now = self.clock.now_ms();
        let mut requests = self.requests.lock();
        self.prune(&mut requests, now);

        if requests.len() >= self.config.max_requests {
            let retry_after_ms = requests
                .front()
                .map(|oldest| (oldest + self.window_ms() - now).max(0) as u64)
                .unwrap_or(0);
            return Err(RateLimitError::Exceeded { retry_after_ms });
        }

        requests.push_back(now);
        Ok(())
    }

    /// Forget all recorded calls.
    pub fn reset(&self) {
        self.requests.lock().clear();
    }
}

/// Run `request` if the limiter has room, otherwise fail without calling it.
pub async fn rate_limited_request<F, Fut, T, E>(limiter: &RateLimiter, request: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<RateLimitError>,
{
    if let Err(e) = limiter.try_acquire() {
        tracing::warn!(
            retry_after_ms = e.retry_after().as_millis() as u64,
            "Outbound request rejected by rate limiter"
        );
        return Err(e.into());
    }
    request().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn limiter(max: usize, window_ms: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let limiter = RateLimiter::new(
            RateLimitConfig {
                max_requests: max,
                window: Duration::from_millis(window_ms),
            },
            clock.clone(),
        );
        (limiter, clock)
    }

    #[test]
    fn test_blocks_after_max_requests() {
        let (limiter, _clock) = limiter(3, 1000);
        for _ in 0..3 {
            assert!(limiter.can_make_request());
            limiter.record_request();
        }
        assert!(!limiter.can_make_request());
    }

    #[test]
    fn test_reopens_after_window_from_oldest() {
        let (limiter, clock) = limiter(2, 1000);
        limiter.record_request();
        clock.advance(Duration::from_millis(400));
        limiter.record_request();
        assert!(!limiter.can_make_request());
        assert_eq!(limiter.time_until_reset(), 600);

        clock.advance(Duration::from_millis(599));
        assert!(!limiter.can_make_request());

        clock.advance(Duration::from_millis(1));
        assert!(limiter.can_make_request());
        assert_eq!(limiter.time_until_reset(), 0);
    }

    #[test]
    fn test_time_until_reset_zero_under_limit() {
        let (limiter, _clock) = limiter(5, 1000);
        limiter.record_request();
        assert_eq!(limiter.time_until_reset(), 0);
    }

    #[test]
    fn test_try_acquire_reports_retry_after() {
        let (limiter, clock) = limiter(1, 10_000);
        assert!(limiter.try_acquire().is_ok());
        clock.advance(Duration::from_millis(2_500));

        let err = limiter.try_acquire().unwrap_err();
        assert_eq!(err.retry_after(), Duration::from_millis(7_500));
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded. Please try again in 8 seconds."
        );
    }

    #[tokio::test]
    async fn test_rate_limited_request_fails_fast() {
        let (limiter, _clock) = limiter(1, 1000);
        let calls = std::sync::atomic::AtomicUsize::new(0);

        let first: Result<u32, RateLimitError> = rate_limited_request(&limiter, || async {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(7)
        })
        .await;
        assert_eq!(first, Ok(7));

        let second: Result<u32, RateLimitError> = rate_limited_request(&limiter, || async {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(8)
        })
        .await;
        assert!(matches!(second, Err(RateLimitError::Exceeded { .. })));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn prop_never_more_than_max_in_window(
            max in 1usize..8,
            window_ms in 10u64..5_000,
            gaps in proptest::collection::vec(0u64..2_000, 1..60),
        ) {
            let (limiter, clock) = limiter(max, window_ms);
            let mut accepted: Vec<i64> = Vec::new();

            for gap in gaps {
                clock.advance(Duration::from_millis(gap));
                if limiter.try_acquire().is_ok() {
                    accepted.push(clock.now_ms());
                }
                let now = clock.now_ms();
                let in_window = accepted
                    .iter()
                    .filter(|t| now - **t < window_ms as i64)
                    .count();
                prop_assert!(in_window <= max);
            }
        }
    }
}
