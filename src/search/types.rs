// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Core types for the share-link search pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Cloud-storage service a share link belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "baidu")]
    Baidu,
    #[serde(rename = "aliyun")]
    Aliyun,
    #[serde(rename = "quark")]
    Quark,
    #[serde(rename = "tianyi")]
    Tianyi,
    #[serde(rename = "uc")]
    Uc,
    #[serde(rename = "mobile")]
    Mobile,
    #[serde(rename = "115")]
    Pan115,
    #[serde(rename = "123")]
    Pan123,
    #[serde(rename = "xunlei")]
    Xunlei,
    #[serde(rename = "pikpak")]
    Pikpak,
    #[serde(rename = "lanzou")]
    Lanzou,
    #[serde(rename = "magnet")]
    Magnet,
    #[serde(rename = "ed2k")]
    Ed2k,
    #[serde(rename = "others")]
    Others,
}

impl ProviderType {
    pub const ALL: [ProviderType; 14] = [
        ProviderType::Baidu,
        ProviderType::Aliyun,
        ProviderType::Quark,
        ProviderType::Tianyi,
        ProviderType::Uc,
        ProviderType::Mobile,
        ProviderType::Pan115,
        ProviderType::Pan123,
        ProviderType::Xunlei,
        ProviderType::Pikpak,
        ProviderType::Lanzou,
        ProviderType::Magnet,
        ProviderType::Ed2k,
        ProviderType::Others,
    ];

    /// Wire name used in responses and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baidu => "baidu",
            Self::Aliyun => "aliyun",
            Self::Quark => "quark",
            Self::Tianyi => "tianyi",
            Self::Uc => "uc",
            Self::Mobile => "mobile",
            Self::Pan115 => "115",
            Self::Pan123 => "123",
            Self::Xunlei => "xunlei",
            Self::Pikpak => "pikpak",
            Self::Lanzou => "lanzou",
            Self::Magnet => "magnet",
            Self::Ed2k => "ed2k",
            Self::Others => "others",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| format!("unknown provider type: {}", s))
    }
}

/// A fetched document handed to the extraction stage
///
/// Produced by a source adapter from one fetched body. Discarded once its
/// links have been extracted.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Name of the source that produced the document
    pub source: String,
    /// Stable identifier of the resource within its source
    pub unique_id: String,
    pub title: String,
    pub content: String,
    /// Text scanned for links and access codes
    pub text: String,
    /// Publish time if the source exposes one
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

/// A positioned link match prior to association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
    pub provider: ProviderType,
    pub url: String,
    /// Byte offset of the first character of the match
    pub start: usize,
    /// Byte offset one past the last character of the (trimmed) match
    pub end: usize,
    /// Credential embedded in the URL itself
    pub inline_credential: Option<String>,
}

/// A positioned access-code match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateCredential {
    pub value: String,
    pub start: usize,
    pub end: usize,
    /// Keyword that introduced the code (e.g. "提取码")
    pub keyword: String,
}

/// How a link record obtained its password
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkOrigin {
    /// Password was embedded in the URL
    Inline,
    /// Password was paired from surrounding text
    Associated,
    /// No password found
    None,
}

/// A normalized share link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    /// Canonical URL, the identity of the link
    pub url: String,
    pub provider_type: ProviderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub origin: LinkOrigin,
}

/// A logical search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResult {
    /// `"{source}-{unique_id}"`
    pub id: String,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Unique by canonical URL
    pub links: Vec<LinkRecord>,
}

/// Per-query options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    /// Pages fetched per source (None uses the configured default)
    pub max_pages: Option<usize>,
    /// Only keep links of these providers (None keeps all)
    pub enabled_providers: Option<Vec<ProviderType>>,
    /// Drop links of these providers
    #[serde(default)]
    pub disabled_providers: Vec<ProviderType>,
    /// Only query these sources (None queries all registered sources)
    pub sources: Option<Vec<String>>,
    /// Skip the cache read
    #[serde(default)]
    pub force_refresh: bool,
}

impl SearchOptions {
    /// Whether links of `provider` survive the per-query toggles
    pub fn allows(&self, provider: ProviderType) -> bool {
        if self.disabled_providers.contains(&provider) {
            return false;
        }
        match &self.enabled_providers {
            Some(enabled) => enabled.contains(&provider),
            None => true,
        }
    }

    /// Whether the named source takes part in this query
    pub fn includes_source(&self, name: &str) -> bool {
        match &self.sources {
            Some(sources) => sources.iter().any(|s| s.eq_ignore_ascii_case(name)),
            None => true,
        }
    }
}

/// Diagnostic for one failed fetch/parse task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailure {
    pub source: String,
    pub target: String,
    pub cause: String,
}

/// Response from a search operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub keyword: String,
    pub results: Vec<ResourceResult>,
    pub total: usize,
    /// Whether the result was served from cache
    pub cached: bool,
    /// Whether the batch deadline cut the search short
    pub timed_out: bool,
    /// Per-task failures that did not abort the batch
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failures: Vec<TaskFailure>,
    pub elapsed_ms: u64,
}

/// Errors from the fetch layer
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Non-retryable HTTP status
    #[error("HTTP {status} for: {url}")]
    Rejected { url: String, status: u16 },

    /// All attempts failed
    #[error("fetch of {url} failed after {attempts} attempts: {last_cause}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_cause: String,
    },

    /// Request could not be sent at all
    #[error("invalid request for {url}: {reason}")]
    InvalidRequest { url: String, reason: String },
}

/// Errors turning a fetched body into documents
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("malformed response from {source_name}: {reason}")]
    Malformed { source_name: String, reason: String },
}

/// Errors surfaced by a search call
#[derive(Debug, Error)]
pub enum SearchError {
    /// Invalid search query
    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// No source is registered or selected
    #[error("No sources available for this query")]
    NoSources,

    /// Every task of the batch failed
    #[error("All {} tasks failed; last causes: {}", .failures.len(), summarize(.failures))]
    AllFailed { failures: Vec<TaskFailure> },
}

fn summarize(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.target, f.cause))
        .collect::<Vec<_>>()
        .join("; ")
}
