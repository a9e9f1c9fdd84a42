// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Share-link extraction from raw text

use std::cmp::Reverse;
use url::Url;

use super::patterns::{PatternTable, ProviderRule};
use super::types::CandidateLink;

/// Markup fragments that commonly trail a URL in scraped text
const MARKUP_SUFFIXES: [&str; 8] = [
    "</a>", "<br>", "<br/>", "<br />", "&nbsp;", "&quot;", "&gt;", "&lt;",
];

const TRAILING_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', ')', ']', '}', '>', '<', '"', '\'', '`', '，', '。', '；', '：',
    '！', '？', '）', '】', '》', '」', '、',
];

/// Scan `text` for share links of every non-excluded provider
///
/// Returns candidates ordered by start offset. When matches overlap, the
/// earliest (then longest) one wins.
pub fn extract_links(text: &str, table: &PatternTable) -> Vec<CandidateLink> {
    let mut candidates = Vec::new();

    for rule in table.rules() {
        if table.is_excluded(rule.provider) {
            continue;
        }
        for m in rule.link_pattern.find_iter(text) {
            let trimmed = trim_artifacts(m.as_str());
            if trimmed.is_empty() {
                continue;
            }
            candidates.push(CandidateLink {
                provider: rule.provider,
                url: trimmed.to_string(),
                start: m.start(),
                end: m.start() + trimmed.len(),
                inline_credential: inline_credential(trimmed, rule),
            });
        }
    }

    candidates.sort_by_key(|c| (c.start, Reverse(c.end), c.provider));

    let mut kept: Vec<CandidateLink> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match kept.last() {
            Some(last) if candidate.start < last.end => continue,
            _ => kept.push(candidate),
        }
    }
    kept
}

/// Strip trailing punctuation and markup left over from scraping
pub fn trim_artifacts(raw: &str) -> &str {
    let mut s = raw.trim_end();
    'outer: loop {
        // Markup first, so "</a>" is not eaten one '>' at a time
        for suffix in MARKUP_SUFFIXES {
            if let Some(cut) = s.len().checked_sub(suffix.len()) {
                if s.is_char_boundary(cut) && s[cut..].eq_ignore_ascii_case(suffix) {
                    s = s[..cut].trim_end();
                    continue 'outer;
                }
            }
        }
        match s.chars().last() {
            Some(c) if TRAILING_PUNCTUATION.contains(&c) => {
                s = s[..s.len() - c.len_utf8()].trim_end();
            }
            _ => return s,
        }
    }
}

/// Access code carried in the URL's query string, if it passes the provider rule
fn inline_credential(url: &str, rule: &ProviderRule) -> Option<String> {
    if rule.credential_params.is_empty() {
        return None;
    }
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(name, value)| {
            rule.is_credential_param(name) && rule.credential_rule.accepts(value)
        })
        .map(|(_, value)| value.into_owned())
}
