// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pairing of access codes with share links
//!
//! Every (link, code) pair where the code follows the link is scored:
//!
//! ```text
//! score = base − distance
//!       + proximity_bonus   if distance < near_threshold
//!       + context_bonus     if a strong hint keyword precedes the code closely
//!       − boundary_penalty  if another link starts between the two
//! ```
//!
//! Pairs with a positive score are then assigned greedily, best first, so a
//! code goes to the link it fits best and each link receives at most one
//! code. Inputs are sorted internally, so the outcome never depends on the
//! order candidates were supplied in.

use std::cmp::Ordering;

use super::config::ScoringWeights;
use super::patterns::PatternTable;
use super::types::{CandidateCredential, CandidateLink, LinkOrigin};

/// Keywords that almost always introduce an access code
const STRONG_HINTS: [&str; 5] = ["提取码", "提取密码", "访问码", "pwd", "passcode"];

/// A link together with its resolved password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub link: CandidateLink,
    pub password: Option<String>,
    pub origin: LinkOrigin,
}

#[derive(Debug, Clone, Copy)]
struct ScoredPair {
    link: usize,
    credential: usize,
    score: i64,
    distance: usize,
}

/// Resolve a password for every link
///
/// Inline credentials are kept as-is. Only links whose provider rule has
/// `requires_explicit_hint` set can receive a code from the text. The result
/// is ordered by link position.
pub fn associate(
    links: &[CandidateLink],
    credentials: &[CandidateCredential],
    text: &str,
    table: &PatternTable,
    weights: &ScoringWeights,
) -> Vec<ResolvedLink> {
    let mut links = links.to_vec();
    links.sort_by(|a, b| {
        (a.start, a.end, a.provider, &a.url).cmp(&(b.start, b.end, b.provider, &b.url))
    });
    links.dedup();

    let mut credentials = credentials.to_vec();
    credentials.sort_by(|a, b| (a.start, a.end, &a.value).cmp(&(b.start, b.end, &b.value)));
    credentials.dedup();

    let mut pairs = Vec::new();
    for (li, link) in links.iter().enumerate() {
        if link.inline_credential.is_some() {
            continue;
        }
        let Some(rule) = table.rule_for(link.provider) else {
            continue;
        };
        if !rule.requires_explicit_hint {
            continue;
        }

        for (ci, credential) in credentials.iter().enumerate() {
            if credential.start < link.end {
                continue;
            }
            if overlaps_any_link(credential, &links) {
                continue;
            }
            if !rule.credential_rule.accepts(&credential.value) {
                continue;
            }

            let (score, distance) = score_pair(link, credential, &links, text, weights);
            if score > 0 {
                pairs.push(ScoredPair {
                    link: li,
                    credential: ci,
                    score,
                    distance,
                });
            }
        }
    }

    pairs.sort_by(|a, b| compare_pairs(a, b, &links, &credentials));

    let mut assigned: Vec<Option<usize>> = vec![None; links.len()];
    let mut taken = vec![false; credentials.len()];
    for pair in pairs {
        if assigned[pair.link].is_none() && !taken[pair.credential] {
            assigned[pair.link] = Some(pair.credential);
            taken[pair.credential] = true;
        }
    }

    links
        .into_iter()
        .zip(assigned)
        .map(|(link, credential)| {
            let (password, origin) = match (&link.inline_credential, credential) {
                (Some(inline), _) => (Some(inline.clone()), LinkOrigin::Inline),
                (None, Some(ci)) => (Some(credentials[ci].value.clone()), LinkOrigin::Associated),
                (None, None) => (None, LinkOrigin::None),
            };
            ResolvedLink {
                link,
                password,
                origin,
            }
        })
        .collect()
}

/// Score one pair, returning `(score, distance_in_chars)`
pub fn score_pair(
    link: &CandidateLink,
    credential: &CandidateCredential,
    all_links: &[CandidateLink],
    text: &str,
    weights: &ScoringWeights,
) -> (i64, usize) {
    let distance = char_distance(text, link.end, credential.start);

    let mut score = weights.base - distance as i64;
    if distance < weights.near_threshold {
        score += weights.proximity_bonus;
    }
    if has_strong_hint(text, credential.start, weights.context_window) {
        score += weights.context_bonus;
    }
    let crosses_boundary = all_links
        .iter()
        .any(|other| other.start > link.end && other.start < credential.start);
    if crosses_boundary {
        score -= weights.boundary_penalty;
    }

    (score, distance)
}

/// Best first: score, then distance, then earliest link, then earliest code
fn compare_pairs(
    a: &ScoredPair,
    b: &ScoredPair,
    links: &[CandidateLink],
    credentials: &[CandidateCredential],
) -> Ordering {
    b.score
        .cmp(&a.score)
        .then(a.distance.cmp(&b.distance))
        .then(links[a.link].start.cmp(&links[b.link].start))
        .then(credentials[a.credential].start.cmp(&credentials[b.credential].start))
        .then(credentials[a.credential].value.cmp(&credentials[b.credential].value))
}

fn overlaps_any_link(credential: &CandidateCredential, links: &[CandidateLink]) -> bool {
    links
        .iter()
        .any(|l| l.start < credential.end && credential.start < l.end)
}

fn char_distance(text: &str, from: usize, to: usize) -> usize {
    if to <= from {
        return 0;
    }
    text.get(from..to)
        .map(|s| s.chars().count())
        .unwrap_or(to - from)
}

fn has_strong_hint(text: &str, credential_start: usize, window: usize) -> bool {
    let Some(before) = text.get(..credential_start) else {
        return false;
    };
    let window_start = before
        .char_indices()
        .rev()
        .nth(window.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let context = before[window_start..].to_lowercase();
    STRONG_HINTS.iter().any(|hint| context.contains(hint))
}
