// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Source adapters
//!
//! An adapter turns a keyword into fetch targets and a fetched body into raw
//! documents. HTML parsing happens only here; the rest of the pipeline sees
//! plain text.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::fetcher::{FetchRequest, HttpMethod};
use super::types::{ParseError, RawDocument};

/// Maximum characters kept in a result's content snippet
const MAX_CONTENT_CHARS: usize = 300;

/// One request of a source, tagged with its page number (1-based)
#[derive(Debug, Clone)]
pub struct SourceTarget {
    pub source: String,
    pub page: usize,
    pub request: FetchRequest,
}

/// Trait for search sources
///
/// Adapters are registered at startup and shared between concurrent tasks.
pub trait SourceAdapter: Send + Sync {
    /// Source name, used in result ids and diagnostics
    fn name(&self) -> &str;

    /// Source priority (lower = preferred)
    fn priority(&self) -> u8 {
        100
    }

    /// Requests for up to `pages` pages of results for `keyword`
    fn targets(&self, keyword: &str, pages: usize, timeout: Duration) -> Vec<SourceTarget>;

    /// Turn one fetched body into documents
    fn parse(&self, body: &[u8], target: &SourceTarget) -> Result<Vec<RawDocument>, ParseError>;
}

/// Request template with `{keyword}` and `{page}` placeholders
///
/// The keyword is form-encoded wherever it is substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<String>,
}

impl RequestTemplate {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Whether the template produces a different request per page
    pub fn is_paginated(&self) -> bool {
        self.url.contains("{page}") || self.body.as_deref().is_some_and(|b| b.contains("{page}"))
    }

    pub fn render(&self, keyword: &str, page: usize, timeout: Duration) -> FetchRequest {
        let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
        let fill = |template: &str| {
            template
                .replace("{keyword}", &encoded)
                .replace("{page}", &page.to_string())
        };

        FetchRequest {
            url: fill(&self.url),
            method: self.method,
            headers: self.headers.clone(),
            body: self.body.as_deref().map(fill),
            timeout,
        }
    }

    fn targets(&self, source: &str, keyword: &str, pages: usize, timeout: Duration) -> Vec<SourceTarget> {
        let pages = if self.is_paginated() { pages } else { pages.min(1) };
        (1..=pages)
            .map(|page| SourceTarget {
                source: source.to_string(),
                page,
                request: self.render(keyword, page, timeout),
            })
            .collect()
    }
}

/// Treats the whole response body as a single document
pub struct TextAdapter {
    name: String,
    priority: u8,
    template: RequestTemplate,
}

impl TextAdapter {
    pub fn new(name: impl Into<String>, priority: u8, template: RequestTemplate) -> Self {
        Self {
            name: name.into(),
            priority,
            template,
        }
    }
}

impl SourceAdapter for TextAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn targets(&self, keyword: &str, pages: usize, timeout: Duration) -> Vec<SourceTarget> {
        self.template.targets(&self.name, keyword, pages, timeout)
    }

    fn parse(&self, body: &[u8], target: &SourceTarget) -> Result<Vec<RawDocument>, ParseError> {
        let text = String::from_utf8_lossy(body).into_owned();
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let title = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| truncate_chars(line, 80))
            .unwrap_or_default();

        Ok(vec![RawDocument {
            source: self.name.clone(),
            unique_id: target.page.to_string(),
            title,
            content: truncate_chars(&clean_text(&text), MAX_CONTENT_CHARS),
            text,
            published_at: None,
            fetched_at: Utc::now(),
        }])
    }
}

/// CSS selectors for list-style result pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlSelectors {
    /// One match per result
    pub item: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    /// Item attribute holding a stable id
    #[serde(default)]
    pub id_attribute: Option<String>,
}

/// Splits an HTML page into one document per matched item
pub struct HtmlListAdapter {
    name: String,
    priority: u8,
    template: RequestTemplate,
    selectors: HtmlSelectors,
}

impl HtmlListAdapter {
    /// Create an adapter, rejecting selectors that do not parse
    pub fn new(
        name: impl Into<String>,
        priority: u8,
        template: RequestTemplate,
        selectors: HtmlSelectors,
    ) -> Result<Self, String> {
        let name = name.into();
        let all = [
            Some(&selectors.item),
            selectors.title.as_ref(),
            selectors.content.as_ref(),
            selectors.date.as_ref(),
        ];
        for selector in all.into_iter().flatten() {
            parse_selector(selector)?;
        }

        Ok(Self {
            name,
            priority,
            template,
            selectors,
        })
    }

    fn malformed(&self, reason: String) -> ParseError {
        ParseError::Malformed {
            source_name: self.name.clone(),
            reason,
        }
    }
}

impl SourceAdapter for HtmlListAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn targets(&self, keyword: &str, pages: usize, timeout: Duration) -> Vec<SourceTarget> {
        self.template.targets(&self.name, keyword, pages, timeout)
    }

    fn parse(&self, body: &[u8], target: &SourceTarget) -> Result<Vec<RawDocument>, ParseError> {
        let html = std::str::from_utf8(body)
            .map_err(|e| self.malformed(format!("body is not UTF-8: {}", e)))?;
        let item_selector = parse_selector(&self.selectors.item).map_err(|e| self.malformed(e))?;
        let title_selector = optional_selector(&self.selectors.title).map_err(|e| self.malformed(e))?;
        let content_selector =
            optional_selector(&self.selectors.content).map_err(|e| self.malformed(e))?;
        let date_selector = optional_selector(&self.selectors.date).map_err(|e| self.malformed(e))?;

        let document = Html::parse_document(html);
        let fetched_at = Utc::now();
        let mut documents = Vec::new();

        for (index, item) in document.select(&item_selector).enumerate() {
            let text = item_text(item);
            if text.trim().is_empty() {
                continue;
            }

            let title = first_text(item, title_selector.as_ref()).unwrap_or_default();
            let content = first_text(item, content_selector.as_ref())
                .unwrap_or_else(|| clean_text(&text));
            let published_at =
                first_text(item, date_selector.as_ref()).and_then(|d| parse_timestamp(&d));

            let unique_id = self
                .selectors
                .id_attribute
                .as_deref()
                .and_then(|attr| item.value().attr(attr))
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}-{}", target.page, index));

            documents.push(RawDocument {
                source: self.name.clone(),
                unique_id,
                title,
                content: truncate_chars(&content, MAX_CONTENT_CHARS),
                text,
                published_at,
                fetched_at,
            });
        }

        Ok(documents)
    }
}

fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|e| format!("invalid selector '{}': {:?}", selector, e))
}

fn optional_selector(selector: &Option<String>) -> Result<Option<Selector>, String> {
    selector.as_deref().map(parse_selector).transpose()
}

fn first_text(item: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    let element = item.select(selector?).next()?;
    let text = clean_text(&element.text().collect::<Vec<_>>().join(" "));
    (!text.is_empty()).then_some(text)
}

/// Text of an item in document order, with anchor targets inlined
///
/// Each `href` is written just before the anchor's own text so a share link
/// hidden behind a label still precedes the access code that follows it.
/// Anchors whose text already shows the target are left as they are.
fn item_text(item: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in item.descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(element) => match element.name() {
                "a" => {
                    let href = element.attr("href").map(str::trim).unwrap_or_default();
                    let shown = ElementRef::wrap(node)
                        .map(|a| a.text().collect::<String>())
                        .unwrap_or_default();
                    if !href.is_empty() && !shown.contains(href) {
                        text.push(' ');
                        text.push_str(href);
                        text.push(' ');
                    }
                }
                "br" | "p" | "div" | "li" | "tr" => text.push('\n'),
                _ => {}
            },
            _ => {}
        }
    }
    text
}

/// Clean text: normalize whitespace
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to `max_chars` characters, preferring a word boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };

    let truncated = &text[..cut];
    match truncated.rfind(' ') {
        Some(last_space) if last_space > 0 => format!("{}...", &text[..last_space]),
        _ => format!("{}...", truncated),
    }
}

/// Parse the date formats result pages commonly use, assuming UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if raw.len() >= 9 && raw.chars().all(|c| c.is_ascii_digit()) {
        return raw.parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0));
    }

    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}
