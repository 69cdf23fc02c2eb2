//! Fixed-window rate limiting keyed by IP, user and route.
//!
//! # Responsibilities
//! - Count requests per composite key (`scope:identifier[:endpoint]`)
//! - Reset a key's window lazily on first access after it elapsed
//! - Sweep expired entries so unique keys cannot grow memory forever
//!
//! # Design Decisions
//! - Fixed windows, not sliding: up to 2x burst at a window boundary in
//!   exchange for O(1) state per key
//! - Entries live in a sharded map; a key is read, reset and incremented under
//!   its shard lock, so per-key counts are exact and there is no global lock
//! - State is process-local and volatile; nothing survives a restart

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::observability::metrics;

/// Which dimension a limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Ip,
    User,
    Endpoint,
}

impl LimitScope {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitScope::Ip => "ip",
            LimitScope::User => "user",
            LimitScope::Endpoint => "endpoint",
        }
    }
}

/// Composite rate-limit key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitKey {
    scope: LimitScope,
    key: String,
}

impl LimitKey {
    pub fn ip(ip: &str) -> Self {
        Self::build(LimitScope::Ip, ip, None)
    }

    pub fn user(user_id: &str) -> Self {
        Self::build(LimitScope::User, user_id, None)
    }

    pub fn endpoint(identifier: &str, endpoint: &str) -> Self {
        Self::build(LimitScope::Endpoint, identifier, Some(endpoint))
    }

    fn build(scope: LimitScope, identifier: &str, endpoint: Option<&str>) -> Self {
        let key = match endpoint {
            Some(endpoint) => format!("{}:{identifier}:{endpoint}", scope.as_str()),
            None => format!("{}:{identifier}", scope.as_str()),
        };
        Self { scope, key }
    }

    pub fn scope(&self) -> LimitScope {
        self.scope
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Outcome of an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Window end as unix seconds.
    pub reset_at: u64,
}

/// A request that exceeded its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded, retry after {retry_after_secs}s")]
pub struct RateLimited {
    pub decision: RateLimitDecision,
    pub retry_after_secs: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: Instant,
}

/// In-memory fixed-window counter store.
#[derive(Debug, Default)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request against `key`.
    ///
    /// Fails with [`RateLimited`] once the post-increment count exceeds `limit`.
    pub fn check_and_increment(
        &self,
        key: &LimitKey,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, RateLimited> {
        self.check_and_increment_at(key, limit, window, Instant::now())
    }

    fn check_and_increment_at(
        &self,
        key: &LimitKey,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> Result<RateLimitDecision, RateLimited> {
        let (count, reset_at) = {
            let mut entry = self
                .entries
                .entry(key.as_str().to_owned())
                .or_insert(RateLimitEntry {
                    count: 0,
                    window_reset_at: now + window,
                });
            if now >= entry.window_reset_at {
                entry.count = 0;
                entry.window_reset_at = now + window;
            }
            entry.count = entry.count.saturating_add(1);
            (entry.count, entry.window_reset_at)
        };

        let until_reset = reset_at.saturating_duration_since(now);
        let decision = RateLimitDecision {
            allowed: count <= limit,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at: unix_secs_after(until_reset),
        };

        if decision.allowed {
            Ok(decision)
        } else {
            Err(RateLimited {
                decision,
                retry_after_secs: ceil_secs(until_reset).max(1),
            })
        }
    }

    /// Delete entries whose window has already elapsed. Returns how many went.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.window_reset_at);
        before.saturating_sub(self.entries.len())
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

fn unix_secs_after(d: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    ceil_secs(now + d)
}

/// Periodically removes expired windows until shutdown.
pub struct RateLimitSweeper {
    limiter: Arc<RateLimiter>,
    interval: Duration,
}

impl RateLimitSweeper {
    pub fn new(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        Self { limiter, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Rate limit sweeper starting");

        let mut ticker = time::interval(self.interval);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.limiter.sweep_expired();
                    let remaining = self.limiter.len();
                    metrics::record_rate_limit_entries(remaining);
                    if removed > 0 {
                        tracing::debug!(removed, remaining, "Swept expired rate limit windows");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate limit sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
