// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! TTL-based cache of finalized search results
//!
//! Entries expire individually by TTL and the whole map is cleared on a
//! fixed interval by [`ResultCache::spawn_invalidation`]. There is no per-key
//! eviction.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

use super::types::{ResourceResult, SearchOptions};

/// One cached result set
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub results: Vec<ResourceResult>,
    pub written_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.written_at) < self.ttl
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Total entries in cache
    pub total: usize,
    /// Expired entries (not yet cleared)
    pub expired: usize,
}

/// TTL-based cache for search results
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResultCache {
    /// Create a new result cache
    ///
    /// # Arguments
    /// * `ttl` - Maximum age of a servable entry
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Get cached results for a key
    ///
    /// Returns None if not found or if the entry is at least `ttl` old
    pub fn get(&self, key: &str) -> Option<Vec<ResourceResult>> {
        self.get_at(key, Instant::now())
    }

    /// Same as [`get`](Self::get) with an explicit clock reading
    pub fn get_at(&self, key: &str, now: Instant) -> Option<Vec<ResourceResult>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;

        if !entry.is_fresh_at(now) {
            return None;
        }

        Some(entry.results.clone())
    }

    /// Store results, replacing any previous entry for the key
    pub fn store(&self, key: &str, results: Vec<ResourceResult>) {
        self.store_at(key, results, Instant::now());
    }

    pub fn store_at(&self, key: &str, results: Vec<ResourceResult>, now: Instant) {
        let mut entries = match self.entries.write() {
            Ok(e) => e,
            Err(_) => return,
        };

        entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                results,
                written_at: now,
                ttl: self.ttl,
            },
        );
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let entries = match self.entries.read() {
            Ok(e) => e,
            Err(_) => {
                return CacheStats {
                    total: 0,
                    expired: 0,
                }
            }
        };

        let now = Instant::now();
        CacheStats {
            total: entries.len(),
            expired: entries.values().filter(|e| !e.is_fresh_at(now)).count(),
        }
    }

    /// Clear the whole cache every `interval` until the cache is dropped
    pub fn spawn_invalidation(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let total = cache.stats().total;
                cache.clear();
                debug!("Cache invalidation cleared {} entries", total);
            }
        })
    }
}

/// Cache key for a query: SHA-256 over the normalized keyword and options
pub fn cache_key(keyword: &str, options: &SearchOptions, pages: usize) -> String {
    let mut enabled: Vec<&str> = options
        .enabled_providers
        .iter()
        .flatten()
        .map(|p| p.as_str())
        .collect();
    enabled.sort_unstable();
    enabled.dedup();
    let mut disabled: Vec<&str> = options.disabled_providers.iter().map(|p| p.as_str()).collect();
    disabled.sort_unstable();
    disabled.dedup();
    let mut sources: Vec<String> = options
        .sources
        .iter()
        .flatten()
        .map(|s| s.to_lowercase())
        .collect();
    sources.sort_unstable();
    sources.dedup();

    let normalized = format!(
        "kw={}|pages={}|enabled={}|{}|disabled={}|sources={}|{}",
        keyword.trim().to_lowercase(),
        pages,
        options.enabled_providers.is_some(),
        enabled.join(","),
        disabled.join(","),
        options.sources.is_some(),
        sources.join(","),
    );

    hex::encode(Sha256::digest(normalized.as_bytes()))
}
