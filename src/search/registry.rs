// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Source registry
//!
//! Sources are described in a TOML file and turned into adapters at startup:
//!
//! ```toml
//! exclude_providers = ["others"]
//!
//! [[source]]
//! name = "panlist"
//! kind = "html"
//! priority = 10
//! url = "https://list.example/search?q={keyword}&page={page}"
//!
//! [source.selectors]
//! item = ".result"
//! title = ".title"
//!
//! [[provider]]
//! provider = "baidu"
//! link_pattern = 'https?://pan\.baidu\.com/s/[A-Za-z0-9_\-]+'
//! min_len = 4
//! max_len = 4
//! requires_explicit_hint = true
//! ```
//!
//! `[[provider]]` entries replace the built-in pattern table when present.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::adapters::{HtmlListAdapter, HtmlSelectors, RequestTemplate, SourceAdapter, TextAdapter};
use super::patterns::{PatternError, PatternTable, ProviderRuleSpec};
use super::types::{ProviderType, SearchOptions};

/// Errors loading or registering sources
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read sources file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sources file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid source '{name}': {reason}")]
    InvalidSource { name: String, reason: String },

    #[error("duplicate source name: {0}")]
    DuplicateSource(String),

    #[error(transparent)]
    Patterns(#[from] PatternError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Whole body is one document
    #[default]
    Text,
    /// One document per selected item
    Html,
}

/// One `[[source]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub request: RequestTemplate,
    #[serde(default)]
    pub selectors: Option<HtmlSelectors>,
}

fn default_priority() -> u8 {
    100
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    /// Build the adapter this entry describes
    pub fn build(&self) -> Result<Arc<dyn SourceAdapter>, RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidSource {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        if !self.request.url.starts_with("http://") && !self.request.url.starts_with("https://") {
            return Err(invalid(format!("url must be http(s): {}", self.request.url)));
        }

        match self.kind {
            SourceKind::Text => Ok(Arc::new(TextAdapter::new(
                self.name.clone(),
                self.priority,
                self.request.clone(),
            ))),
            SourceKind::Html => {
                let selectors = self
                    .selectors
                    .clone()
                    .ok_or_else(|| invalid("html sources need [source.selectors]".to_string()))?;
                let adapter =
                    HtmlListAdapter::new(self.name.clone(), self.priority, self.request.clone(), selectors)
                        .map_err(invalid)?;
                Ok(Arc::new(adapter))
            }
        }
    }
}

/// Parsed sources file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesFile {
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
    #[serde(default, rename = "provider")]
    pub providers: Vec<ProviderRuleSpec>,
    /// Providers whose links are never reported
    #[serde(default)]
    pub exclude_providers: Vec<ProviderType>,
}

impl SourcesFile {
    /// Load a sources file from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, RegistryError> {
        Ok(toml::from_str(content)?)
    }

    /// Pattern table for this file: custom rules if any, else the defaults
    pub fn pattern_table(&self) -> Result<PatternTable, RegistryError> {
        let table = if self.providers.is_empty() {
            PatternTable::default()
        } else {
            PatternTable::from_specs(&self.providers)?
        };
        Ok(table.with_excluded(self.exclude_providers.iter().copied()))
    }

    /// Registry of every enabled source
    pub fn registry(&self) -> Result<SourceRegistry, RegistryError> {
        SourceRegistry::from_configs(&self.sources)
    }
}

/// Registered source adapters, ordered by priority
#[derive(Default, Clone)]
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[SourceConfig]) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for config in configs {
            if !config.enabled {
                debug!("Source {} disabled, skipping", config.name);
                continue;
            }
            registry.register(config.build()?)?;
        }
        Ok(registry)
    }

    /// Add an adapter; names are unique ignoring case
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> Result<(), RegistryError> {
        if self
            .adapters
            .iter()
            .any(|a| a.name().eq_ignore_ascii_case(adapter.name()))
        {
            return Err(RegistryError::DuplicateSource(adapter.name().to_string()));
        }

        debug!("Registered source {} (priority {})", adapter.name(), adapter.priority());
        self.adapters.push(adapter);
        // Sort by priority (lower = preferred), then name
        self.adapters
            .sort_by(|a, b| a.priority().cmp(&b.priority()).then_with(|| a.name().cmp(b.name())));
        Ok(())
    }

    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    /// Adapters taking part in a query
    pub fn select(&self, options: &SearchOptions) -> Vec<Arc<dyn SourceAdapter>> {
        self.adapters
            .iter()
            .filter(|a| options.includes_source(a.name()))
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Names that appear in `options.sources` but match no registered source
    pub fn unknown_sources(&self, options: &SearchOptions) -> Vec<String> {
        let known: HashSet<String> = self.adapters.iter().map(|a| a.name().to_lowercase()).collect();
        options
            .sources
            .iter()
            .flatten()
            .filter(|s| !known.contains(&s.to_lowercase()))
            .cloned()
            .collect()
    }
}
