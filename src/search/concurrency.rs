// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Adaptive concurrency limiting for fetch+extract tasks
//!
//! The limit moves within `[min_limit, max_limit]`: on every adjustment the
//! mean latency of the tasks completed since the previous adjustment is
//! compared to a threshold, shrinking the limit by `step` when slow and
//! growing it when not. Slots are RAII permits, so a slot is released when
//! its task finishes, fails, panics or is cancelled.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use super::config::ConcurrencyConfig;

#[derive(Debug)]
struct LimiterState {
    limit: usize,
    in_flight: usize,
    samples: VecDeque<Duration>,
}

/// Point-in-time view of the limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub pending_samples: usize,
}

/// Latency-driven concurrency limiter
#[derive(Debug)]
pub struct AdaptiveLimiter {
    state: Mutex<LimiterState>,
    notify: Notify,
    min_limit: usize,
    max_limit: usize,
    step: usize,
    latency_threshold: Duration,
    adjust_interval: Duration,
    sample_window: usize,
}

/// A held concurrency slot, released on drop
#[derive(Debug)]
pub struct LimiterPermit {
    limiter: Arc<AdaptiveLimiter>,
    started: Instant,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.limiter.release(self.started.elapsed());
    }
}

impl AdaptiveLimiter {
    pub fn new(config: &ConcurrencyConfig) -> Arc<Self> {
        let min_limit = config.min_limit.max(1);
        let max_limit = config.max_limit.max(min_limit);

        Arc::new(Self {
            state: Mutex::new(LimiterState {
                limit: config.initial_limit.clamp(min_limit, max_limit),
                in_flight: 0,
                samples: VecDeque::new(),
            }),
            notify: Notify::new(),
            min_limit,
            max_limit,
            step: config.step.max(1),
            latency_threshold: Duration::from_millis(config.latency_threshold_ms),
            adjust_interval: Duration::from_millis(config.adjust_interval_ms.max(1)),
            sample_window: config.sample_window.max(1),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        // Permits release from Drop, so a poisoned lock must stay usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take a slot if one is free right now
    pub fn try_acquire(self: &Arc<Self>) -> Option<LimiterPermit> {
        let mut state = self.lock();
        if state.in_flight < state.limit {
            state.in_flight += 1;
            Some(LimiterPermit {
                limiter: Arc::clone(self),
                started: Instant::now(),
            })
        } else {
            None
        }
    }

    /// Wait until a slot is free and take it
    pub async fn acquire(self: &Arc<Self>) -> LimiterPermit {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed
            notified.as_mut().enable();

            if let Some(permit) = self.try_acquire() {
                return permit;
            }
            notified.await;
        }
    }

    fn release(&self, latency: Duration) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.record_latency(latency);
        self.notify.notify_one();
    }

    /// Keep a latency sample for the next adjustment
    fn record_latency(&self, latency: Duration) {
        let mut state = self.lock();
        state.samples.push_back(latency);
        while state.samples.len() > self.sample_window {
            state.samples.pop_front();
        }
    }

    /// Recompute the limit from samples gathered since the last call
    ///
    /// Returns the new limit. Without samples the limit is left unchanged.
    pub fn adjust(&self) -> usize {
        let (old, new, mean) = {
            let mut state = self.lock();
            if state.samples.is_empty() {
                return state.limit;
            }
            let total: Duration = state.samples.iter().sum();
            let mean = total / state.samples.len() as u32;
            state.samples.clear();

            let old = state.limit;
            state.limit = if mean > self.latency_threshold {
                old.saturating_sub(self.step).max(self.min_limit)
            } else {
                old.saturating_add(self.step).min(self.max_limit)
            };
            (old, state.limit, mean)
        };

        if new != old {
            debug!(
                "Concurrency limit {} -> {} (mean latency {}ms)",
                old,
                new,
                mean.as_millis()
            );
        }
        if new > old {
            self.notify.notify_waiters();
        }
        new
    }

    /// Run [`adjust`](Self::adjust) on the configured interval until dropped
    pub fn spawn_adjuster(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        let interval = self.adjust_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match limiter.upgrade() {
                    Some(limiter) => {
                        limiter.adjust();
                    }
                    None => break,
                }
            }
        })
    }

    pub fn limit(&self) -> usize {
        self.lock().limit
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub fn bounds(&self) -> (usize, usize) {
        (self.min_limit, self.max_limit)
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        let state = self.lock();
        LimiterSnapshot {
            limit: state.limit,
            in_flight: state.in_flight,
            pending_samples: state.samples.len(),
        }
    }
}
