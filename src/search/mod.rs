// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Share-link search pipeline
//!
//! Fans a keyword out over configured sources and turns the fetched pages
//! into normalized cloud-storage share links with their access codes.
//!
//! Key features:
//! - Pluggable sources (plain text and HTML list pages) loaded from TOML
//! - Data-driven provider patterns and access-code rules
//! - Proximity scoring to pair access codes with links
//! - TTL-based result caching with periodic wholesale invalidation
//! - Latency-adaptive concurrency and bounded fetch retries

pub mod adapters;
pub mod associator;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod credentials;
pub mod dedup;
pub mod extractor;
pub mod fetcher;
pub mod orchestrator;
pub mod patterns;
pub mod rate_limiter;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use adapters::{HtmlListAdapter, RequestTemplate, SourceAdapter, SourceTarget, TextAdapter};
pub use cache::{CacheStats, ResultCache};
pub use concurrency::{AdaptiveLimiter, LimiterPermit, LimiterSnapshot};
pub use config::{ConcurrencyConfig, FetchConfig, RetryPolicy, ScoringWeights, SearchConfig};
pub use fetcher::{FetchRequest, Fetcher, HttpMethod, HttpResponse, HttpTransport, ReqwestTransport};
pub use orchestrator::SearchOrchestrator;
pub use patterns::{CredentialRule, PatternTable, ProviderRuleSpec};
pub use registry::{RegistryError, SourceConfig, SourceRegistry, SourcesFile};
pub use types::{
    FetchError, LinkOrigin, LinkRecord, ParseError, ProviderType, ResourceResult, SearchError,
    SearchOptions, SearchResponse, TaskFailure,
};
