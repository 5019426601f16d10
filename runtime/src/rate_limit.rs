use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded, retry after {}ms", retry_after.as_millis())]
    Exceeded { retry_after: Duration },
}

/// Rolling-window call counter guarding an external quota.
///
/// Callers ask for a slot before each outbound request and back off on
/// [`RateLimitError::Exceeded`] instead of receiving a remote 429.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn try_acquire(&self) -> Result<(), RateLimitError> {
        let now = Instant::now();
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut calls, now);

        if calls.len() >= self.max_requests {
            let oldest = calls.front().copied().unwrap_or(now);
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            return Err(RateLimitError::Exceeded { retry_after });
        }

        calls.push_back(now);
        Ok(())
    }

    /// Waits out the window instead of failing. Used to pace the follow-up
    /// requests of one logical operation that already holds a slot.
    pub async fn wait_for_slot(&self) {
        while let Err(RateLimitError::Exceeded { retry_after }) = self.try_acquire() {
            debug!(wait_ms = retry_after.as_millis() as u64, "pacing request under rate limit");
            tokio::time::sleep(retry_after).await;
        }
    }

    /// Calls still available in the current window.
    pub fn remaining(&self) -> usize {
        let now = Instant::now();
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut calls, now);
        self.max_requests - calls.len()
    }

    fn evict_expired(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(first) = calls.front() {
            if now.duration_since(*first) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    #[tokio::test(start_paused = true)]
    async fn rejects_calls_beyond_quota() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        for _ in 0..3 {
            limiter.try_acquire().unwrap();
        }
        assert_eq!(limiter.remaining(), 0);

        let err = limiter.try_acquire().unwrap_err();
        assert_eq!(
            err,
            RateLimitError::Exceeded {
                retry_after: Duration::from_secs(1)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_a_slot_sleeps_out_the_window() {
        let limiter = RateLimiter::new(2, Duration::from_millis(1000));
        let started = Instant::now();
        for _ in 0..5 {
            limiter.wait_for_slot().await;
        }
        // slots 3-4 wait one window, slot 5 a second one
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
        assert_eq!(limiter.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_rolls_forward() {
        let limiter = RateLimiter::new(2, Duration::from_millis(1000));
        limiter.try_acquire().unwrap();
        time::advance(Duration::from_millis(600)).await;
        limiter.try_acquire().unwrap();

        match limiter.try_acquire() {
            Err(RateLimitError::Exceeded { retry_after }) => {
                assert_eq!(retry_after, Duration::from_millis(400));
            }
            Ok(()) => panic!("third call inside the window must be rejected"),
        }

        time::advance(Duration::from_millis(400)).await;
        assert_eq!(limiter.remaining(), 1);
        limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_err());
    }

    #[test]
    fn zero_quota_is_clamped() {
        let limiter = RateLimiter::new(0, Duration::from_secs(1));
        assert_eq!(limiter.max_requests(), 1);
    }
}
