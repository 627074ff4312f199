//! Per-client token-bucket rate limiting.
//!
//! Each client IP gets its own bucket holding up to `burst` tokens, refilled
//! continuously at `rate` tokens per second. A request consumes one token.
//! Buckets that sit idle are evicted by `sweep_idle` so the map stays bounded
//! by the number of recently active clients.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, trace};

pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 1000.0;
pub const DEFAULT_BURST: u32 = 2000;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admitted,
    Limited {
        /// Time until one token is available again.
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled: Instant,
}

impl Bucket {
    fn full(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst,
            refilled: now,
        }
    }

    fn refill(&mut self, rate: f64, burst: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.refilled).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.refilled = now;
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    buckets: DashMap<IpAddr, Bucket>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_SECOND, DEFAULT_BURST)
    }
}

impl RateLimiter {
    /// `burst` is clamped to at least one so a fresh client is never refused.
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            rate: requests_per_second.max(0.0),
            burst: f64::from(burst.max(1)),
            buckets: DashMap::new(),
        }
    }

    pub fn check(&self, client: IpAddr) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// `check` with an explicit clock, for deterministic tests.
    pub fn check_at(&self, client: IpAddr, now: Instant) -> RateDecision {
        let mut bucket = self
            .buckets
            .entry(client)
            .or_insert_with(|| Bucket::full(self.burst, now));
        bucket.refill(self.rate, self.burst, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return RateDecision::Admitted;
        }

        // A tiny rate can put the wait beyond what `Duration` holds.
        let retry_after = Duration::try_from_secs_f64((1.0 - bucket.tokens) / self.rate)
            .unwrap_or(Duration::MAX);
        trace!(%client, ?retry_after, "rate limit exceeded");
        RateDecision::Limited { retry_after }
    }

    /// Drop buckets untouched for longer than `ttl`. Returns how many were removed.
    pub fn sweep_idle(&self, ttl: Duration) -> usize {
        self.sweep_idle_at(ttl, Instant::now())
    }

    pub fn sweep_idle_at(&self, ttl: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.refilled) <= ttl);
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, remaining = self.buckets.len(), "evicted idle rate limit buckets");
        }
        removed
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}
