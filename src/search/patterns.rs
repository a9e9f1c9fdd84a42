// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Provider pattern table
//!
//! Maps each provider type to the pattern that recognizes its share links and
//! the rule its access codes must satisfy. The table is plain data: it can be
//! built from [`ProviderRuleSpec`]s loaded from configuration, and
//! [`PatternTable::default`] ships specs for the common providers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use super::types::ProviderType;

/// Character-class and length rule for access codes (ASCII alphanumeric)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRule {
    pub min_len: usize,
    pub max_len: usize,
}

impl CredentialRule {
    pub const fn exact(len: usize) -> Self {
        Self {
            min_len: len,
            max_len: len,
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        let len = value.len();
        len >= self.min_len
            && len <= self.max_len
            && value.bytes().all(|b| b.is_ascii_alphanumeric())
    }
}

/// Serializable description of one provider rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRuleSpec {
    pub provider: ProviderType,
    pub link_pattern: String,
    /// Query parameters that carry the access code inside the URL
    #[serde(default)]
    pub credential_params: Vec<String>,
    pub min_len: usize,
    pub max_len: usize,
    /// Links of this provider may be paired with codes found in the text
    #[serde(default)]
    pub requires_explicit_hint: bool,
    #[serde(default = "default_true")]
    pub strip_trailing_slash: bool,
}

fn default_true() -> bool {
    true
}

/// Compiled provider rule
#[derive(Debug, Clone)]
pub struct ProviderRule {
    pub provider: ProviderType,
    pub link_pattern: Regex,
    pub credential_params: Vec<String>,
    pub credential_rule: CredentialRule,
    pub requires_explicit_hint: bool,
    pub strip_trailing_slash: bool,
}

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid link pattern for {provider}: {source}")]
    InvalidPattern {
        provider: ProviderType,
        #[source]
        source: regex::Error,
    },

    #[error("invalid credential rule for {provider}: min {min_len} > max {max_len}")]
    InvalidRule {
        provider: ProviderType,
        min_len: usize,
        max_len: usize,
    },
}

impl ProviderRule {
    pub fn compile(spec: &ProviderRuleSpec) -> Result<Self, PatternError> {
        if spec.min_len == 0 || spec.min_len > spec.max_len {
            return Err(PatternError::InvalidRule {
                provider: spec.provider,
                min_len: spec.min_len,
                max_len: spec.max_len,
            });
        }
        let link_pattern =
            Regex::new(&spec.link_pattern).map_err(|source| PatternError::InvalidPattern {
                provider: spec.provider,
                source,
            })?;

        Ok(Self {
            provider: spec.provider,
            link_pattern,
            credential_params: spec.credential_params.clone(),
            credential_rule: CredentialRule {
                min_len: spec.min_len,
                max_len: spec.max_len,
            },
            requires_explicit_hint: spec.requires_explicit_hint,
            strip_trailing_slash: spec.strip_trailing_slash,
        })
    }

    /// Whether `name` is a credential-bearing query parameter for this provider
    pub fn is_credential_param(&self, name: &str) -> bool {
        self.credential_params
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name))
    }
}

/// The provider table consulted by extraction and association
#[derive(Debug, Clone)]
pub struct PatternTable {
    rules: Vec<ProviderRule>,
    excluded: HashSet<ProviderType>,
    general_rule: CredentialRule,
}

impl PatternTable {
    pub fn new(rules: Vec<ProviderRule>) -> Self {
        // The loosest bounds any provider accepts; per-provider rules narrow later
        let general_rule = CredentialRule {
            min_len: rules
                .iter()
                .map(|r| r.credential_rule.min_len)
                .min()
                .unwrap_or(4),
            max_len: rules
                .iter()
                .map(|r| r.credential_rule.max_len)
                .max()
                .unwrap_or(4),
        };

        Self {
            rules,
            excluded: HashSet::new(),
            general_rule,
        }
    }

    pub fn from_specs(specs: &[ProviderRuleSpec]) -> Result<Self, PatternError> {
        let rules = specs
            .iter()
            .map(ProviderRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    /// Deny-list providers globally; their links are dropped at extraction
    pub fn with_excluded(mut self, excluded: impl IntoIterator<Item = ProviderType>) -> Self {
        self.excluded.extend(excluded);
        self
    }

    pub fn rules(&self) -> &[ProviderRule] {
        &self.rules
    }

    pub fn rule_for(&self, provider: ProviderType) -> Option<&ProviderRule> {
        self.rules.iter().find(|r| r.provider == provider)
    }

    pub fn is_excluded(&self, provider: ProviderType) -> bool {
        self.excluded.contains(&provider)
    }

    /// Rule every access-code candidate must pass before association
    pub fn general_credential_rule(&self) -> CredentialRule {
        self.general_rule
    }

    /// Specs for the providers this crate knows out of the box
    pub fn default_specs() -> Vec<ProviderRuleSpec> {
        const QUERY: &str = r"(?:[?&][A-Za-z0-9_\-]+=[A-Za-z0-9_\-%.]*)*";
        let web = |provider, pattern: &str, hint: bool| ProviderRuleSpec {
            provider,
            link_pattern: format!("{}{}", pattern, QUERY),
            credential_params: vec!["pwd".into(), "password".into(), "passcode".into()],
            min_len: 4,
            max_len: 4,
            requires_explicit_hint: hint,
            strip_trailing_slash: true,
        };

        let mut tianyi = web(
            ProviderType::Tianyi,
            r"https?://cloud\.189\.cn/(?:t/[A-Za-z0-9]+|web/share\?code=[A-Za-z0-9]+)",
            true,
        );
        tianyi.credential_params.push("accessCode".into());

        let mut lanzou = web(
            ProviderType::Lanzou,
            r"https?://(?:[A-Za-z0-9\-]+\.)?lanzou[a-z]\.com/[A-Za-z0-9_\-]+",
            true,
        );
        lanzou.min_len = 3;
        lanzou.max_len = 6;

        vec![
            web(
                ProviderType::Baidu,
                r"https?://(?:pan|yun)\.baidu\.com/(?:s/[A-Za-z0-9_\-]+|share/init\?surl=[A-Za-z0-9_\-]+)",
                true,
            ),
            web(
                ProviderType::Aliyun,
                r"https?://(?:www\.)?(?:aliyundrive|alipan)\.com/s/[A-Za-z0-9]+",
                true,
            ),
            web(ProviderType::Quark, r"https?://pan\.quark\.cn/s/[A-Za-z0-9]+", true),
            tianyi,
            web(ProviderType::Uc, r"https?://drive\.uc\.cn/s/[A-Za-z0-9]+", true),
            web(
                ProviderType::Mobile,
                r"https?://caiyun\.139\.com/(?:m|w)/i[?/][A-Za-z0-9]+",
                true,
            ),
            web(
                ProviderType::Pan115,
                r"https?://(?:115|115cdn|anxia)\.com/s/[A-Za-z0-9]+",
                true,
            ),
            web(
                ProviderType::Pan123,
                r"https?://(?:www\.)?(?:123pan|123684|123865|123912)\.(?:com|cn)/s/[A-Za-z0-9_\-]+",
                true,
            ),
            web(
                ProviderType::Xunlei,
                r"https?://pan\.xunlei\.com/s/[A-Za-z0-9_\-]+",
                true,
            ),
            web(ProviderType::Pikpak, r"https?://mypikpak\.com/s/[A-Za-z0-9]+", false),
            lanzou,
            ProviderRuleSpec {
                provider: ProviderType::Magnet,
                link_pattern: r"magnet:\?xt=urn:btih:[A-Za-z0-9]{32,40}".into(),
                credential_params: Vec::new(),
                min_len: 4,
                max_len: 4,
                requires_explicit_hint: false,
                strip_trailing_slash: false,
            },
            ProviderRuleSpec {
                provider: ProviderType::Ed2k,
                link_pattern: r"ed2k://\|file\|[^|\s]+\|\d+\|[A-Fa-f0-9]{32}\|/?".into(),
                credential_params: Vec::new(),
                min_len: 4,
                max_len: 4,
                requires_explicit_hint: false,
                strip_trailing_slash: false,
            },
        ]
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        let rules = Self::default_specs()
            .iter()
            .filter_map(|spec| ProviderRule::compile(spec).ok())
            .collect();
        Self::new(rules)
    }
}
