//! Per-identity fixed window state machine.

use std::time::Duration;
use tokio::time::Instant;

use super::{Admission, LimitPolicy};

/// Counter state for one identity (not thread-safe on its own).
///
/// [`RateLimiter`](super::RateLimiter) keeps these inside a `DashMap`, whose
/// entry guard makes [`RateWindow::record`] atomic per identity.
#[derive(Debug, Clone)]
pub(crate) struct RateWindow {
    /// Requests observed in the current window, including rejected ones.
    pub(crate) count: u32,
    /// When the current window opened.
    pub(crate) window_start: Instant,
    /// Last request seen from this identity.
    pub(crate) last_seen: Instant,
}

impl RateWindow {
    /// Fresh window with no requests counted yet.
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            last_seen: now,
        }
    }

    pub(crate) fn is_idle(&self, now: Instant, idle_expiration: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) >= idle_expiration
    }

    fn window_elapsed(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }

    fn reset_after(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.window_start))
    }

    /// Count one request at `now`.
    ///
    /// An idle or rolled-over window restarts at a count of 1. Otherwise the
    /// count is incremented, and the request is rejected when it exceeds
    /// the quota. On rejection the time until the window resets is returned.
    pub(crate) fn record(&mut self, now: Instant, policy: &LimitPolicy) -> Result<Admission, Duration> {
        if self.count == 0
            || self.is_idle(now, policy.idle_expiration)
            || self.window_elapsed(now, policy.window)
        {
            self.count = 1;
            self.window_start = now;
        } else {
            self.count = self.count.saturating_add(1);
        }
        self.last_seen = now;

        let reset_after = self.reset_after(now, policy.window);
        if self.count > policy.requests {
            return Err(reset_after);
        }

        Ok(Admission {
            limit: policy.requests,
            remaining: policy.requests - self.count,
            reset_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(requests: u32) -> LimitPolicy {
        LimitPolicy {
            requests,
            window: Duration::from_secs(60),
            idle_expiration: Duration::from_secs(1200),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_opens_window() {
        let now = Instant::now();
        let mut window = RateWindow::new(now);

        let admission = window.record(now, &policy(3)).unwrap();
        assert_eq!(window.count, 1);
        assert_eq!(admission.remaining, 2);
        assert_eq!(admission.reset_after, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_past_quota_and_reports_retry() {
        let start = Instant::now();
        let mut window = RateWindow::new(start);
        let policy = policy(2);

        window.record(start, &policy).unwrap();
        window.record(start + Duration::from_secs(10), &policy).unwrap();
        let retry = window
            .record(start + Duration::from_secs(15), &policy)
            .unwrap_err();

        assert_eq!(retry, Duration::from_secs(45));
        assert_eq!(window.count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollover_restarts_count() {
        let start = Instant::now();
        let mut window = RateWindow::new(start);
        let policy = policy(1);

        window.record(start, &policy).unwrap();
        assert!(window.record(start + Duration::from_secs(59), &policy).is_err());

        let admission = window
            .record(start + Duration::from_secs(60), &policy)
            .unwrap();
        assert_eq!(window.count, 1);
        assert_eq!(admission.remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_window_restarts_even_inside_window_length() {
        let start = Instant::now();
        let mut window = RateWindow::new(start);
        let policy = LimitPolicy {
            requests: 5,
            window: Duration::from_secs(3600),
            idle_expiration: Duration::from_secs(60),
        };

        for _ in 0..3 {
            window.record(start, &policy).unwrap();
        }
        assert!(window.is_idle(start + Duration::from_secs(60), policy.idle_expiration));

        window.record(start + Duration::from_secs(61), &policy).unwrap();
        assert_eq!(window.count, 1);
    }
}
