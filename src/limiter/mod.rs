//! Per-client admission control.
//!
//! Each identity (client address, API key, ...) gets a fixed window counter
//! that is created lazily on its first request. State machine per identity:
//!
//! - **Unseen**: no entry in the registry
//! - **Active**: `count` requests seen since `window_start`
//! - **Expired**: idle past `idle_expiration`, evicted by [`RateLimiter::sweep`]
//!   or restarted lazily on the next request
//!
//! The registry is a [`DashMap`], so the read-check-increment for one identity
//! runs under that entry's shard lock and busy clients do not serialize
//! admission for everybody else.

mod window;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use window::RateWindow;

/// Quota configuration shared by every identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    /// Maximum admitted requests per window.
    pub requests: u32,
    /// Fixed window length.
    pub window: Duration,
    /// Idle time after which an identity's state is discarded.
    pub idle_expiration: Duration,
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            requests: 60,
            window: Duration::from_secs(60),
            idle_expiration: Duration::from_secs(20 * 60),
        }
    }
}

/// An admitted request and the quota left in its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window rolls over.
    pub reset_after: Duration,
}

/// Rejection signal: the identity exhausted its quota for this window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub identity: String,
    pub limit: u32,
    /// Time until the current window rolls over.
    pub retry_after: Duration,
}

impl std::fmt::Display for RateLimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rate limit of {} requests exceeded, retry in {}s",
            self.limit,
            self.retry_after.as_secs().max(1)
        )
    }
}

impl std::error::Error for RateLimitExceeded {}

/// Concurrent registry of per-identity rate windows.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    policy: LimitPolicy,
}

impl RateLimiter {
    pub fn new(policy: LimitPolicy) -> Self {
        Self {
            windows: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &LimitPolicy {
        &self.policy
    }

    /// Admit or reject one request from `identity`.
    pub fn check(&self, identity: &str) -> Result<Admission, RateLimitExceeded> {
        self.check_at(identity, Instant::now())
    }

    fn check_at(&self, identity: &str, now: Instant) -> Result<Admission, RateLimitExceeded> {
        // Fast path avoids allocating the key for known identities.
        let outcome = match self.windows.get_mut(identity) {
            Some(mut entry) => entry.record(now, &self.policy),
            None => self
                .windows
                .entry(identity.to_string())
                .or_insert_with(|| RateWindow::new(now))
                .record(now, &self.policy),
        };

        outcome.map_err(|retry_after| RateLimitExceeded {
            identity: identity.to_string(),
            limit: self.policy.requests,
            retry_after,
        })
    }

    /// Evict every identity idle for at least the configured expiration.
    ///
    /// Returns the number of evicted identities.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| !window.is_idle(now, self.policy.idle_expiration));
        before.saturating_sub(self.windows.len())
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    /// Requests counted in `identity`'s current window, if tracked.
    pub fn count(&self, identity: &str) -> Option<u32> {
        self.windows.get(identity).map(|entry| entry.count)
    }
}

/// Run [`RateLimiter::sweep`] every `every` until the handle is aborted.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = limiter.sweep();
            if evicted > 0 {
                tracing::debug!(
                    evicted = evicted,
                    tracked = limiter.tracked(),
                    "Evicted idle rate-limit windows"
                );
            }
        }
    })
}
