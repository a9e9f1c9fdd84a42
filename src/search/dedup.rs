// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! URL canonicalization and link deduplication

use std::collections::HashMap;
use url::Url;

use super::types::LinkRecord;

/// Query parameters that only track where a share was clicked from
const TRACKING_PARAMS: [&str; 5] = ["spm", "from", "share_source", "share_medium", "fbclid"];

/// Canonical form of a share URL
///
/// HTTP(S) URLs get a lower-cased scheme and host, lose their fragment,
/// tracking parameters and any parameter named in `credential_params`, and
/// optionally their trailing slash. Other schemes (magnet, ed2k) are only
/// trimmed. Returns `None` for empty or unparsable input.
///
/// `canonicalize(canonicalize(u)) == canonicalize(u)`.
pub fn canonicalize(
    raw: &str,
    credential_params: &[String],
    strip_trailing_slash: bool,
) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let lower = raw.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Some(raw.to_string());
    }

    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| {
            let name = name.to_ascii_lowercase();
            !name.starts_with("utm_")
                && !TRACKING_PARAMS.contains(&name.as_str())
                && !credential_params.iter().any(|p| p.eq_ignore_ascii_case(&name))
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut canonical = url.to_string();
    if strip_trailing_slash && url.query().is_none() {
        while canonical.ends_with('/') && !canonical.ends_with("://") {
            canonical.pop();
        }
    }
    Some(canonical)
}

/// Collapse records sharing a canonical URL, keeping the first seen
///
/// A first-seen record without a password takes the password (and origin)
/// of the first later duplicate that has one. Records with an empty URL are
/// dropped. Order of first appearance is kept, so
/// `dedup_links(dedup_links(x)) == dedup_links(x)`.
pub fn dedup_links(records: Vec<LinkRecord>) -> Vec<LinkRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<LinkRecord> = Vec::with_capacity(records.len());

    for record in records {
        if record.url.trim().is_empty() {
            continue;
        }
        match index.get(&record.url) {
            Some(&i) => {
                let existing = &mut kept[i];
                if existing.password.is_none() && record.password.is_some() {
                    existing.password = record.password;
                    existing.origin = record.origin;
                }
            }
            None => {
                index.insert(record.url.clone(), kept.len());
                kept.push(record);
            }
        }
    }
    kept
}
