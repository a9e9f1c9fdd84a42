// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request pacing for upstream fetches

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovRateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Paces fetch attempts to a requests-per-minute budget
///
/// A budget of zero disables pacing entirely.
#[derive(Clone)]
pub struct FetchRateLimiter {
    limiter: Option<Arc<GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    requests_per_minute: u32,
}

impl FetchRateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `requests_per_minute` - Maximum attempts allowed per minute, 0 for unlimited
    pub fn new(requests_per_minute: u32) -> Self {
        let limiter = NonZeroU32::new(requests_per_minute)
            .map(|rpm| Arc::new(GovRateLimiter::direct(Quota::per_minute(rpm))));

        Self {
            limiter,
            requests_per_minute,
        }
    }

    /// Whether an attempt may start right now
    #[cfg(test)]
    fn check(&self) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => true,
        }
    }

    /// Wait until the budget allows another attempt
    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Get the configured requests per minute
    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    pub fn is_unlimited(&self) -> bool {
        self.limiter.is_none()
    }
}
