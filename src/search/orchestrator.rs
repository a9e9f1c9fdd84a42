// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Search orchestration
//!
//! Coordinates source adapters, fetching, extraction, caching, and
//! concurrency limiting for one query at a time.

use futures::FutureExt;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::adapters::{SourceAdapter, SourceTarget};
use super::associator::associate;
use super::cache::{cache_key, CacheStats, ResultCache};
use super::concurrency::{AdaptiveLimiter, LimiterSnapshot};
use super::config::{ScoringWeights, SearchConfig};
use super::credentials::resolve_credentials;
use super::dedup::{canonicalize, dedup_links};
use super::extractor::extract_links;
use super::fetcher::Fetcher;
use super::patterns::PatternTable;
use super::registry::SourceRegistry;
use super::types::{
    LinkRecord, RawDocument, ResourceResult, SearchError, SearchOptions, SearchResponse,
    TaskFailure,
};

/// Longest keyword accepted, in characters
const MAX_KEYWORD_CHARS: usize = 256;

/// State shared by the tasks of one batch
struct TaskContext {
    fetcher: Arc<Fetcher>,
    patterns: Arc<PatternTable>,
    limiter: Arc<AdaptiveLimiter>,
    weights: ScoringWeights,
    options: SearchOptions,
}

enum TaskOutcome {
    Success {
        priority: u8,
        results: Vec<ResourceResult>,
    },
    Failed(TaskFailure),
}

/// Handles of the orchestrator's background tasks
pub struct BackgroundTasks {
    pub cache_invalidation: JoinHandle<()>,
    pub limit_adjuster: JoinHandle<()>,
}

impl BackgroundTasks {
    pub fn abort(&self) {
        self.cache_invalidation.abort();
        self.limit_adjuster.abort();
    }
}

/// Main search orchestrator that fans a query out over all sources
pub struct SearchOrchestrator {
    fetcher: Arc<Fetcher>,
    patterns: Arc<PatternTable>,
    registry: SourceRegistry,
    cache: Arc<ResultCache>,
    limiter: Arc<AdaptiveLimiter>,
    config: SearchConfig,
}

impl SearchOrchestrator {
    /// Create an orchestrator with its own cache and limiter
    pub fn new(
        config: SearchConfig,
        fetcher: Fetcher,
        patterns: PatternTable,
        registry: SourceRegistry,
    ) -> Self {
        let cache = Arc::new(ResultCache::new(Duration::from_secs(config.cache_ttl_secs)));
        let limiter = AdaptiveLimiter::new(&config.concurrency);

        Self {
            fetcher: Arc::new(fetcher),
            patterns: Arc::new(patterns),
            registry,
            cache,
            limiter,
            config,
        }
    }

    /// Use a shared cache instead of the orchestrator's own
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Start periodic cache invalidation and limit adjustment
    ///
    /// Both tasks stop on their own once the orchestrator is dropped.
    pub fn spawn_background_tasks(&self) -> BackgroundTasks {
        let interval = Duration::from_secs(self.config.cache_invalidation_secs.max(1));
        BackgroundTasks {
            cache_invalidation: self.cache.spawn_invalidation(interval),
            limit_adjuster: self.limiter.spawn_adjuster(),
        }
    }

    /// Perform a search
    ///
    /// # Arguments
    /// * `keyword` - The search keyword
    /// * `options` - Per-query page count, provider and source filters
    ///
    /// # Returns
    /// Merged results, or an error when the query is invalid, no source
    /// applies, or every task failed
    pub async fn search(
        &self,
        keyword: &str,
        options: SearchOptions,
    ) -> Result<SearchResponse, SearchError> {
        let start = Instant::now();
        let keyword = validate_keyword(keyword)?;
        let pages = self.resolve_pages(&options);
        let key = cache_key(&keyword, &options, pages);

        if !options.force_refresh {
            if let Some(results) = self.cache.get(&key) {
                debug!("Cache hit for keyword: {}", keyword);
                return Ok(SearchResponse {
                    keyword,
                    total: results.len(),
                    results,
                    cached: true,
                    timed_out: false,
                    failures: Vec::new(),
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        }

        let adapters = self.registry.select(&options);
        let timeout = self.config.request_timeout();
        let targets: Vec<(Arc<dyn SourceAdapter>, SourceTarget)> = adapters
            .iter()
            .flat_map(|adapter| {
                adapter
                    .targets(&keyword, pages, timeout)
                    .into_iter()
                    .map(move |target| (Arc::clone(adapter), target))
            })
            .collect();

        if targets.is_empty() {
            return Err(SearchError::NoSources);
        }

        let task_count = targets.len();
        debug!(
            "Searching '{}' across {} sources ({} tasks)",
            keyword,
            adapters.len(),
            task_count
        );

        let context = Arc::new(TaskContext {
            fetcher: Arc::clone(&self.fetcher),
            patterns: Arc::clone(&self.patterns),
            limiter: Arc::clone(&self.limiter),
            weights: self.config.scoring.clone(),
            options: options.clone(),
        });

        let mut tasks = JoinSet::new();
        for (adapter, target) in targets {
            tasks.spawn(run_task(Arc::clone(&context), adapter, target));
        }

        let deadline = tokio::time::Instant::now() + self.config.batch_deadline();
        let mut collected: Vec<(u8, ResourceResult)> = Vec::new();
        let mut failures: Vec<TaskFailure> = Vec::new();
        let mut succeeded = 0usize;
        let mut timed_out = false;

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(TaskOutcome::Success { priority, results }))) => {
                    succeeded += 1;
                    collected.extend(results.into_iter().map(|r| (priority, r)));
                }
                Ok(Some(Ok(TaskOutcome::Failed(failure)))) => {
                    warn!(
                        "Task {} for {} failed: {}",
                        failure.target, failure.source, failure.cause
                    );
                    failures.push(failure);
                }
                Ok(Some(Err(e))) => {
                    warn!("Search task did not complete: {}", e);
                    failures.push(TaskFailure {
                        source: "unknown".to_string(),
                        target: "unknown".to_string(),
                        cause: e.to_string(),
                    });
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    tasks.abort_all();
                    // Wait for the cancelled tasks so their permits are released
                    while tasks.join_next().await.is_some() {}
                    break;
                }
            }
        }

        if timed_out {
            warn!(
                "Batch deadline reached for '{}': {} of {} tasks finished",
                keyword,
                succeeded + failures.len(),
                task_count
            );
        } else if succeeded == 0 {
            return Err(SearchError::AllFailed { failures });
        }

        let results = finalize(collected);
        if !timed_out {
            self.cache.store(&key, results.clone());
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            "Search complete: {} results for '{}' in {}ms ({} failed tasks)",
            results.len(),
            keyword,
            elapsed_ms,
            failures.len()
        );

        Ok(SearchResponse {
            keyword,
            total: results.len(),
            results,
            cached: false,
            timed_out,
            failures,
            elapsed_ms,
        })
    }

    fn resolve_pages(&self, options: &SearchOptions) -> usize {
        options
            .max_pages
            .unwrap_or(self.config.default_max_pages)
            .clamp(1, self.config.max_pages_limit.max(1))
    }

    /// Names of the registered sources, by priority
    pub fn sources(&self) -> Vec<&str> {
        self.registry.names()
    }

    pub fn patterns(&self) -> &PatternTable {
        &self.patterns
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Clear the result cache
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn limiter_snapshot(&self) -> LimiterSnapshot {
        self.limiter.snapshot()
    }
}

fn validate_keyword(keyword: &str) -> Result<String, SearchError> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Err(SearchError::InvalidQuery {
            reason: "keyword must not be empty".to_string(),
        });
    }
    if keyword.chars().count() > MAX_KEYWORD_CHARS {
        return Err(SearchError::InvalidQuery {
            reason: format!("keyword exceeds {} characters", MAX_KEYWORD_CHARS),
        });
    }
    Ok(keyword.to_string())
}

async fn run_task(
    context: Arc<TaskContext>,
    adapter: Arc<dyn SourceAdapter>,
    target: SourceTarget,
) -> TaskOutcome {
    let source = target.source.clone();
    let url = target.request.url.clone();

    let outcome = AssertUnwindSafe(fetch_and_extract(&context, adapter.as_ref(), &target))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(results)) => TaskOutcome::Success {
            priority: adapter.priority(),
            results,
        },
        Ok(Err(cause)) => TaskOutcome::Failed(TaskFailure {
            source,
            target: url,
            cause,
        }),
        Err(_) => TaskOutcome::Failed(TaskFailure {
            source,
            target: url,
            cause: "task panicked".to_string(),
        }),
    }
}

async fn fetch_and_extract(
    context: &TaskContext,
    adapter: &dyn SourceAdapter,
    target: &SourceTarget,
) -> Result<Vec<ResourceResult>, String> {
    let _permit = context.limiter.acquire().await;

    let body = context
        .fetcher
        .fetch(&target.request)
        .await
        .map_err(|e| e.to_string())?;
    let documents = adapter.parse(&body, target).map_err(|e| e.to_string())?;

    debug!(
        "Parsed {} documents from {} page {}",
        documents.len(),
        target.source,
        target.page
    );

    Ok(documents
        .iter()
        .map(|doc| build_result(doc, &context.patterns, &context.weights, &context.options))
        .collect())
}

/// Extract, resolve and associate the links of one document
pub fn build_result(
    doc: &RawDocument,
    patterns: &PatternTable,
    weights: &ScoringWeights,
    options: &SearchOptions,
) -> ResourceResult {
    let links = extract_links(&doc.text, patterns);
    let credentials = resolve_credentials(&doc.text, &patterns.general_credential_rule());
    let resolved = associate(&links, &credentials, &doc.text, patterns, weights);

    let records: Vec<LinkRecord> = resolved
        .into_iter()
        .filter(|r| options.allows(r.link.provider))
        .filter_map(|r| {
            let (params, strip) = match patterns.rule_for(r.link.provider) {
                Some(rule) => (rule.credential_params.as_slice(), rule.strip_trailing_slash),
                None => (&[][..], true),
            };
            let url = canonicalize(&r.link.url, params, strip)?;
            Some(LinkRecord {
                url,
                provider_type: r.link.provider,
                password: r.password,
                origin: r.origin,
            })
        })
        .collect();

    ResourceResult {
        id: format!("{}-{}", doc.source, doc.unique_id),
        title: doc.title.clone(),
        content: doc.content.clone(),
        timestamp: doc.published_at.unwrap_or(doc.fetched_at),
        links: dedup_links(records),
    }
}

/// Merge results sharing an id, drop link-less results and sort
///
/// Order: source priority, then newest first, then id.
fn finalize(collected: Vec<(u8, ResourceResult)>) -> Vec<ResourceResult> {
    let mut merged: Vec<(u8, ResourceResult)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (priority, result) in collected {
        match index.get(&result.id) {
            Some(&i) => {
                let (_, existing) = &mut merged[i];
                if existing.title.is_empty() {
                    existing.title = result.title;
                }
                if existing.content.is_empty() {
                    existing.content = result.content;
                }
                existing.timestamp = existing.timestamp.max(result.timestamp);
                let mut links = std::mem::take(&mut existing.links);
                links.extend(result.links);
                existing.links = dedup_links(links);
            }
            None => {
                index.insert(result.id.clone(), merged.len());
                merged.push((priority, result));
            }
        }
    }

    merged.retain(|(_, r)| !r.links.is_empty());
    merged.sort_by(|(pa, a), (pb, b)| {
        (pa, Reverse(a.timestamp), &a.id).cmp(&(pb, Reverse(b.timestamp), &b.id))
    });
    merged.into_iter().map(|(_, r)| r).collect()
}
