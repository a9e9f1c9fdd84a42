// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Access-code discovery in free text
//!
//! Finds `keyword separator token` runs such as `提取码: 8f2k` or `pwd=8f2k`.
//! The token is the maximal ASCII alphanumeric run after the separator; an
//! occurrence whose token breaks the credential rule yields nothing rather
//! than a truncated guess.

use regex::Regex;
use std::sync::OnceLock;

use super::patterns::CredentialRule;
use super::types::CandidateCredential;

const KEYWORD_PATTERN: &str = r"(?i)(提取密码|提取码|访问码|密码|口令|passcode|password|pwd|code)([ \t\u{3000}]*[:：=][ \t\r\n\u{3000}]*|[ \t\u{3000}]+)?([A-Za-z0-9]+)";

fn keyword_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(KEYWORD_PATTERN).expect("keyword pattern is a valid regex"))
}

/// Scan `text` for access codes that satisfy `rule`, ordered by position
pub fn resolve_credentials(text: &str, rule: &CredentialRule) -> Vec<CandidateCredential> {
    let mut credentials = Vec::new();

    for caps in keyword_regex().captures_iter(text) {
        let (Some(keyword), Some(token)) = (caps.get(1), caps.get(3)) else {
            continue;
        };
        let has_separator = caps.get(2).is_some();
        let ascii_keyword = keyword.as_str().is_ascii();

        if ascii_keyword {
            // "barcode", "xpwd" and "pwdabcd" are not keywords
            let preceded_by_letter = text[..keyword.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphabetic());
            if preceded_by_letter || !has_separator {
                continue;
            }
        }

        if !rule.accepts(token.as_str()) {
            continue;
        }

        credentials.push(CandidateCredential {
            value: token.as_str().to_string(),
            start: token.start(),
            end: token.end(),
            keyword: keyword.as_str().to_lowercase(),
        });
    }

    credentials
}
