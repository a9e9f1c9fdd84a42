// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for the share-link search pipeline

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Top-level search configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Fetch and retry settings
    pub fetch: FetchConfig,
    /// Adaptive concurrency bounds
    pub concurrency: ConcurrencyConfig,
    /// Weights of the link/access-code pairing heuristic
    pub scoring: ScoringWeights,
    /// Cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// Interval of the wholesale cache clear in seconds
    pub cache_invalidation_secs: u64,
    /// Overall deadline of one search batch in milliseconds
    pub batch_deadline_ms: u64,
    /// Pages fetched per source when the query does not say
    pub default_max_pages: usize,
    /// Hard cap on pages per source regardless of the query
    pub max_pages_limit: usize,
}

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub retry: RetryPolicy,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Requests per minute across all sources (0 disables pacing)
    pub rate_limit_per_minute: u32,
    pub user_agent: String,
}

/// Retry policy shared by every fetch
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound of any single delay in milliseconds
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base × 2^(retry−1)`, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

/// Adaptive concurrency limiter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyConfig {
    pub min_limit: usize,
    pub max_limit: usize,
    pub initial_limit: usize,
    /// Amount the limit moves per adjustment
    pub step: usize,
    /// Mean task latency above which the limit shrinks, in milliseconds
    pub latency_threshold_ms: u64,
    /// Adjustment interval in milliseconds
    pub adjust_interval_ms: u64,
    /// Most recent samples kept between adjustments
    pub sample_window: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            min_limit: 2,
            max_limit: 32,
            initial_limit: 8,
            step: 2,
            latency_threshold_ms: 3000,
            adjust_interval_ms: 1000,
            sample_window: 64,
        }
    }
}

/// Weights for pairing access codes with links
///
/// `score = base − distance (+ proximity_bonus) (+ context_bonus) (− boundary_penalty)`
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub base: i64,
    pub proximity_bonus: i64,
    /// Distance in characters below which the proximity bonus applies
    pub near_threshold: usize,
    pub context_bonus: i64,
    /// Characters before a code searched for a hint keyword
    pub context_window: usize,
    pub boundary_penalty: i64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: 1000,
            proximity_bonus: 200,
            near_threshold: 50,
            context_bonus: 100,
            context_window: 12,
            boundary_penalty: 800,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl SearchConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let retry = RetryPolicy {
            max_attempts: env_or("NETDISK_FETCH_MAX_ATTEMPTS", defaults.fetch.retry.max_attempts),
            base_delay_ms: env_or(
                "NETDISK_FETCH_BACKOFF_BASE_MS",
                defaults.fetch.retry.base_delay_ms,
            ),
            max_delay_ms: env_or(
                "NETDISK_FETCH_BACKOFF_MAX_MS",
                defaults.fetch.retry.max_delay_ms,
            ),
        };

        Self {
            fetch: FetchConfig {
                retry,
                request_timeout_ms: env_or(
                    "NETDISK_FETCH_TIMEOUT_MS",
                    defaults.fetch.request_timeout_ms,
                ),
                rate_limit_per_minute: env_or(
                    "NETDISK_RATE_LIMIT_PER_MINUTE",
                    defaults.fetch.rate_limit_per_minute,
                ),
                user_agent: env::var("NETDISK_USER_AGENT").unwrap_or(defaults.fetch.user_agent),
            },
            concurrency: ConcurrencyConfig {
                min_limit: env_or("NETDISK_CONCURRENCY_MIN", defaults.concurrency.min_limit),
                max_limit: env_or("NETDISK_CONCURRENCY_MAX", defaults.concurrency.max_limit),
                initial_limit: env_or(
                    "NETDISK_CONCURRENCY_INITIAL",
                    defaults.concurrency.initial_limit,
                ),
                step: env_or("NETDISK_CONCURRENCY_STEP", defaults.concurrency.step),
                latency_threshold_ms: env_or(
                    "NETDISK_LATENCY_THRESHOLD_MS",
                    defaults.concurrency.latency_threshold_ms,
                ),
                adjust_interval_ms: env_or(
                    "NETDISK_CONCURRENCY_ADJUST_MS",
                    defaults.concurrency.adjust_interval_ms,
                ),
                sample_window: defaults.concurrency.sample_window,
            },
            scoring: ScoringWeights {
                base: env_or("NETDISK_SCORE_BASE", defaults.scoring.base),
                proximity_bonus: env_or(
                    "NETDISK_SCORE_PROXIMITY_BONUS",
                    defaults.scoring.proximity_bonus,
                ),
                near_threshold: env_or(
                    "NETDISK_SCORE_NEAR_THRESHOLD",
                    defaults.scoring.near_threshold,
                ),
                context_bonus: env_or("NETDISK_SCORE_CONTEXT_BONUS", defaults.scoring.context_bonus),
                context_window: env_or(
                    "NETDISK_SCORE_CONTEXT_WINDOW",
                    defaults.scoring.context_window,
                ),
                boundary_penalty: env_or(
                    "NETDISK_SCORE_BOUNDARY_PENALTY",
                    defaults.scoring.boundary_penalty,
                ),
            },
            cache_ttl_secs: env_or("NETDISK_CACHE_TTL_SECS", defaults.cache_ttl_secs),
            cache_invalidation_secs: env_or(
                "NETDISK_CACHE_INVALIDATION_SECS",
                defaults.cache_invalidation_secs,
            ),
            batch_deadline_ms: env_or("NETDISK_BATCH_DEADLINE_MS", defaults.batch_deadline_ms),
            default_max_pages: env_or("NETDISK_DEFAULT_PAGES", defaults.default_max_pages),
            max_pages_limit: defaults.max_pages_limit,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.fetch.retry.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.fetch.retry.base_delay_ms > self.fetch.retry.max_delay_ms {
            return Err("backoff base delay must not exceed the max delay".to_string());
        }
        if self.fetch.request_timeout_ms == 0 {
            return Err("request timeout must be greater than 0".to_string());
        }
        let c = &self.concurrency;
        if c.min_limit == 0 {
            return Err("concurrency min must be at least 1".to_string());
        }
        if c.min_limit > c.max_limit {
            return Err("concurrency min must not exceed max".to_string());
        }
        if c.initial_limit < c.min_limit || c.initial_limit > c.max_limit {
            return Err("initial concurrency must lie within [min, max]".to_string());
        }
        if c.adjust_interval_ms == 0 {
            return Err("concurrency adjust interval must be greater than 0".to_string());
        }
        if self.cache_ttl_secs == 0 {
            return Err("Cache TTL must be greater than 0".to_string());
        }
        if self.cache_invalidation_secs == 0 {
            return Err("Cache invalidation interval must be greater than 0".to_string());
        }
        if self.batch_deadline_ms == 0 {
            return Err("batch deadline must be greater than 0".to_string());
        }
        if self.default_max_pages == 0 || self.default_max_pages > self.max_pages_limit {
            return Err(format!(
                "default pages must lie within [1, {}]",
                self.max_pages_limit
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch.request_timeout_ms)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_millis(self.batch_deadline_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig {
                retry: RetryPolicy::default(),
                request_timeout_ms: 8000,
                rate_limit_per_minute: 0,
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            },
            concurrency: ConcurrencyConfig::default(),
            scoring: ScoringWeights::default(),
            cache_ttl_secs: 3600,
            cache_invalidation_secs: 6 * 3600,
            batch_deadline_ms: 15000,
            default_max_pages: 1,
            max_pages_limit: 10,
        }
    }
}
