//! Admission sampling and rate limiting on the cache backend
//!
//! Two limiters share the atomic increment-and-expire primitive:
//!
//! - [`AdmissionSampler`] guards event ingestion with a per-project-per-second
//!   counter and graduated sampling: below the soft limit everything is
//!   accepted, at/above the hard limit everything is dropped, and in between
//!   the drop probability ramps linearly up to a cap so acceptance degrades
//!   smoothly instead of cliff-dropping.
//!
//! - [`RateLimiter`] is a fixed window counter (requests/minute + burst) for
//!   the dashboard/admin surface.
//!
//! Both read their counters from the shared cache backend, so with the Redis
//! backend multiple ingest processes act as one admission point. A dropped
//! event is signalled as "sampled", not as an error: the caller must not retry.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::CacheService;
use super::key::CacheKey;
use crate::core::constants::{
    DEFAULT_RATE_LIMIT_WINDOW_SECS, INGEST_COUNTER_TTL_SECS, INGEST_MAX_DROP_PROBABILITY,
};

// ============================================================================
// ADMISSION SAMPLER (graduated, per-second)
// ============================================================================

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Below the soft limit, accepted unconditionally
    Accept,
    /// In the graduated band, kept by the sampling coin flip
    AcceptSampled,
    /// Dropped by sampling or the hard limit; the caller must not retry
    Drop,
}

impl AdmissionDecision {
    pub fn accepted(&self) -> bool {
        !matches!(self, Self::Drop)
    }
}

/// Graduated per-second admission sampler
pub struct AdmissionSampler {
    cache: Arc<CacheService>,
    soft_limit: u32,
    hard_limit: u32,
}

impl AdmissionSampler {
    /// Create a sampler; `hard_limit` must be greater than `soft_limit`
    /// (validated at configuration load).
    pub fn new(cache: Arc<CacheService>, soft_limit: u32, hard_limit: u32) -> Self {
        Self {
            cache,
            soft_limit,
            hard_limit,
        }
    }

    /// Check whether an event for `project_id` should be admitted this second.
    ///
    /// One atomic increment-and-expire per call; no read-then-write races
    /// under concurrent admission.
    pub async fn check(&self, project_id: &str) -> AdmissionDecision {
        let second = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "System clock is before UNIX epoch");
                0
            });

        let key = CacheKey::admission_counter(project_id, second);
        let count = match self
            .cache
            .incr(&key, Some(Duration::from_secs(INGEST_COUNTER_TTL_SECS)))
            .await
        {
            Ok(c) => c,
            Err(e) => {
                // Admit on cache failure rather than blocking ingestion
                tracing::error!(
                    project_id,
                    error = %e,
                    "Admission counter increment failed, accepting event"
                );
                return AdmissionDecision::Accept;
            }
        };

        let decision = self.decide(count, rand::random::<f64>());

        tracing::trace!(project_id, count, decision = ?decision, "Admission check");
        decision
    }

    /// Pure decision function: counter value + coin flip -> decision.
    ///
    /// Drop probability between the limits is
    /// `(count - soft) / (hard - soft)`, capped at the configured maximum.
    fn decide(&self, count: i64, coin: f64) -> AdmissionDecision {
        let soft = i64::from(self.soft_limit);
        let hard = i64::from(self.hard_limit);

        if count <= soft {
            return AdmissionDecision::Accept;
        }
        if count >= hard {
            return AdmissionDecision::Drop;
        }

        let over = (count - soft) as f64;
        let span = (hard - soft).max(1) as f64;
        let drop_probability = (over / span).min(INGEST_MAX_DROP_PROBABILITY);

        if coin >= drop_probability {
            AdmissionDecision::AcceptSampled
        } else {
            AdmissionDecision::Drop
        }
    }
}

// ============================================================================
// FIXED-WINDOW RATE LIMITER (dashboard/admin surface)
// ============================================================================

/// Rate limit bucket configuration
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    /// Bucket name (e.g., "api", "admin")
    pub name: &'static str,
    /// Maximum requests per window
    pub requests_per_window: u32,
    /// Window duration in seconds
    pub window_secs: u64,
    /// Burst allowance (additional requests above limit)
    pub burst: u32,
}

impl RateLimitBucket {
    /// Create an API rate limit bucket
    pub fn api(rpm: u32) -> Self {
        Self {
            name: "api",
            requests_per_window: rpm,
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            burst: rpm / 20, // 5% burst
        }
    }

    /// Get the total limit (requests + burst)
    pub fn total_limit(&self) -> u32 {
        self.requests_per_window.saturating_add(self.burst)
    }
}

/// Rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Requests remaining in window
    pub remaining: u32,
    /// Total limit (rpm + burst)
    pub limit: u32,
    /// Unix timestamp when window resets
    pub reset_at: u64,
    /// Seconds until retry (only if blocked)
    pub retry_after: Option<u64>,
}

/// Fixed window rate limiter using the cache backend
pub struct RateLimiter {
    cache: Arc<CacheService>,
}

impl RateLimiter {
    pub fn new(cache: Arc<CacheService>) -> Self {
        Self { cache }
    }

    /// Check rate limit for identifier in bucket
    pub async fn check(&self, bucket: &RateLimitBucket, identifier: &str) -> RateLimitResult {
        let key = CacheKey::rate_limit(bucket.name, identifier);
        let window_duration = Duration::from_secs(bucket.window_secs);

        // Capture time first to keep reset_at consistent with the TTL read
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "System clock is before UNIX epoch");
                0
            });

        let count = match self.cache.incr(&key, Some(window_duration)).await {
            Ok(c) => c,
            Err(e) => {
                // Allow on cache failure rather than blocking requests
                tracing::error!(
                    bucket = bucket.name,
                    %identifier,
                    error = %e,
                    "Rate limit cache increment failed, allowing request"
                );
                1
            }
        };

        let limit = bucket.total_limit();
        let limit_i64 = i64::from(limit);
        let allowed = count <= limit_i64;
        let remaining = limit_i64.saturating_sub(count).try_into().unwrap_or(0u32);

        let ttl = self.cache.ttl(&key).await.ok().flatten();
        let reset_at = now.saturating_add(ttl.map(|d| d.as_secs()).unwrap_or(bucket.window_secs));

        tracing::trace!(
            bucket = bucket.name,
            %identifier,
            count,
            limit,
            allowed,
            "Rate limit check"
        );

        RateLimitResult {
            allowed,
            remaining,
            limit,
            reset_at,
            retry_after: if allowed {
                None
            } else {
                Some(reset_at.saturating_sub(now))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::test_cache;

    async fn sampler(soft: u32, hard: u32) -> AdmissionSampler {
        AdmissionSampler::new(Arc::new(test_cache().await), soft, hard)
    }

    #[tokio::test]
    async fn test_below_soft_limit_always_accepts() {
        let sampler = sampler(10, 20).await;
        for coin in [0.0, 0.5, 0.999] {
            for count in 1..=10 {
                assert_eq!(sampler.decide(count, coin), AdmissionDecision::Accept);
            }
        }
    }

    #[tokio::test]
    async fn test_at_hard_limit_always_drops() {
        let sampler = sampler(10, 20).await;
        for coin in [0.0, 0.5, 0.999] {
            assert_eq!(sampler.decide(20, coin), AdmissionDecision::Drop);
            assert_eq!(sampler.decide(100, coin), AdmissionDecision::Drop);
        }
    }

    #[tokio::test]
    async fn test_graduated_band_ramps_linearly() {
        let sampler = sampler(100, 200).await;

        // count=150: drop probability 0.5
        assert_eq!(
            sampler.decide(150, 0.49),
            AdmissionDecision::Drop,
            "coin below drop probability is dropped"
        );
        assert_eq!(
            sampler.decide(150, 0.51),
            AdmissionDecision::AcceptSampled,
            "coin above drop probability is kept"
        );

        // count=190: drop probability 0.9 (also the cap)
        assert_eq!(sampler.decide(190, 0.89), AdmissionDecision::Drop);
        assert_eq!(sampler.decide(190, 0.91), AdmissionDecision::AcceptSampled);
    }

    #[tokio::test]
    async fn test_drop_probability_capped() {
        let sampler = sampler(100, 1100).await;
        // count=1099: raw probability 0.999, capped at 0.9
        assert_eq!(sampler.decide(1099, 0.95), AdmissionDecision::AcceptSampled);
        assert_eq!(sampler.decide(1099, 0.85), AdmissionDecision::Drop);
    }

    #[tokio::test]
    async fn test_empirical_drop_rate_converges() {
        let sampler = sampler(100, 200).await;

        // count=150 over many coin flips should drop roughly half
        let trials = 10_000;
        let dropped = (0..trials)
            .filter(|_| sampler.decide(150, rand::random::<f64>()) == AdmissionDecision::Drop)
            .count();
        let rate = dropped as f64 / trials as f64;
        assert!(
            (0.45..0.55).contains(&rate),
            "expected ~0.5 drop rate, got {rate}"
        );
    }

    #[tokio::test]
    async fn test_check_counts_per_project() {
        let sampler = sampler(2, 4).await;

        // Two events under the soft limit are accepted outright
        assert_eq!(sampler.check("p1").await, AdmissionDecision::Accept);
        assert_eq!(sampler.check("p1").await, AdmissionDecision::Accept);
        // A different project has its own counter
        assert_eq!(sampler.check("p2").await, AdmissionDecision::Accept);
    }

    #[tokio::test]
    async fn test_rate_limit_allows_under_limit() {
        let cache = Arc::new(test_cache().await);
        let limiter = RateLimiter::new(cache);
        let bucket = RateLimitBucket::api(100);

        for i in 0..50 {
            let result = limiter.check(&bucket, "10.0.0.1").await;
            assert!(result.allowed, "Request {} should be allowed", i);
            assert!(result.retry_after.is_none());
        }
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_over_limit() {
        let cache = Arc::new(test_cache().await);
        let limiter = RateLimiter::new(cache);
        let bucket = RateLimitBucket {
            name: "test",
            requests_per_window: 5,
            window_secs: 60,
            burst: 0,
        };

        for i in 0..5 {
            let result = limiter.check(&bucket, "10.0.0.1").await;
            assert!(result.allowed, "Request {} should be allowed", i);
        }

        let result = limiter.check(&bucket, "10.0.0.1").await;
        assert!(!result.allowed, "Request 6 should be blocked");
        assert!(result.retry_after.is_some());
    }

    #[tokio::test]
    async fn test_rate_limit_burst_allowance() {
        let cache = Arc::new(test_cache().await);
        let limiter = RateLimiter::new(cache);
        let bucket = RateLimitBucket {
            name: "test",
            requests_per_window: 10,
            window_secs: 60,
            burst: 5,
        };

        for i in 0..15 {
            let result = limiter.check(&bucket, "10.0.0.1").await;
            assert!(result.allowed, "Request {} should be allowed", i);
        }
        assert!(!limiter.check(&bucket, "10.0.0.1").await.allowed);
    }

    #[tokio::test]
    async fn test_rate_limit_different_identifiers() {
        let cache = Arc::new(test_cache().await);
        let limiter = RateLimiter::new(cache);
        let bucket = RateLimitBucket {
            name: "test",
            requests_per_window: 5,
            window_secs: 60,
            burst: 0,
        };

        for _ in 0..5 {
            limiter.check(&bucket, "10.0.0.1").await;
        }
        assert!(!limiter.check(&bucket, "10.0.0.1").await.allowed);
        assert!(limiter.check(&bucket, "10.0.0.2").await.allowed);
    }
}
