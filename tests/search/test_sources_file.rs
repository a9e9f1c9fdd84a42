// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Sources loaded from a TOML file driving a full search
use chrono::NaiveDate;
use std::io::Write;
use std::sync::{Arc, Mutex};

use netdisk_search::search::{LinkOrigin, ProviderType, SearchOptions, SourcesFile};

use super::helpers::{build_orchestrator_with_patterns, ok, status, test_config, ScriptedTransport};

const SOURCES: &str = r#"
exclude_providers = ["magnet"]

[[source]]
name = "panlist"
kind = "html"
priority = 10
url = "https://list.example/search?q={keyword}&page={page}"

[source.selectors]
item = "li.result"
title = ".title"
date = ".date"
id_attribute = "data-id"

[[source]]
name = "plain"
priority = 5
url = "https://plain.example/s/{keyword}"

[[source]]
name = "off"
url = "https://off.example/s/{keyword}"
enabled = false
"#;

const LIST_PAGE: &str = r#"<html><body><ul>
<li class="result" data-id="r1">
  <span class="title">流浪地球 4K</span>
  <span class="date">2024-03-01</span>
  <a href="https://pan.baidu.com/s/1AbCdEf">网盘下载</a> 提取码: 8f2k
  <a href="magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567">磁力</a>
</li>
<li class="result" data-id="r2"><span class="title">没有链接</span></li>
</ul></body></html>"#;

fn sources_file() -> SourcesFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SOURCES.as_bytes()).unwrap();
    SourcesFile::from_file(file.path()).unwrap()
}

#[tokio::test]
async fn test_search_over_sources_file() {
    let file = sources_file();
    let registry = file.registry().unwrap();
    let patterns = file.pattern_table().unwrap();
    assert_eq!(registry.names(), vec!["plain", "panlist"]);

    let requested = Arc::new(Mutex::new(Vec::new()));
    let seen = requested.clone();
    let transport = Arc::new(ScriptedTransport::new(move |req| {
        seen.lock().unwrap().push(req.url.clone());
        if req.url.starts_with("https://list.example/") {
            ok(LIST_PAGE)
        } else if req.url.starts_with("https://plain.example/") {
            ok("夸克：https://pan.quark.cn/s/abc123 提取码: qq11")
        } else {
            status(404)
        }
    }));
    let orchestrator = build_orchestrator_with_patterns(transport, registry, test_config(), patterns);

    let response = orchestrator
        .search(
            "流浪地球",
            SearchOptions {
                max_pages: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let urls = requested.lock().unwrap().clone();
    assert_eq!(urls.len(), 2);
    assert!(urls.iter().all(|u| !u.starts_with("https://off.example/")));
    assert!(urls.iter().any(|u| u.ends_with("&page=1")));

    // Priority order: plain (5) before panlist (10); the linkless item is gone
    let ids: Vec<_> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["plain-1", "panlist-r1"]);

    let listed = &response.results[1];
    assert_eq!(listed.title, "流浪地球 4K");
    assert_eq!(
        listed.timestamp.date_naive(),
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    );
    assert_eq!(listed.links.len(), 1);
    assert_eq!(listed.links[0].provider_type, ProviderType::Baidu);
    assert_eq!(listed.links[0].url, "https://pan.baidu.com/s/1AbCdEf");
    assert_eq!(listed.links[0].password.as_deref(), Some("8f2k"));
    assert_eq!(listed.links[0].origin, LinkOrigin::Associated);

    let plain = &response.results[0];
    assert_eq!(plain.links[0].provider_type, ProviderType::Quark);
    assert_eq!(plain.links[0].password.as_deref(), Some("qq11"));
}

#[tokio::test]
async fn test_only_filter_against_file_sources() {
    let file = sources_file();
    let transport = Arc::new(ScriptedTransport::new(|_| ok(LIST_PAGE)));
    let orchestrator = build_orchestrator_with_patterns(
        transport.clone(),
        file.registry().unwrap(),
        test_config(),
        file.pattern_table().unwrap(),
    );

    let options = SearchOptions {
        max_pages: Some(2),
        sources: Some(vec!["panlist".to_string()]),
        ..Default::default()
    };
    let response = orchestrator.search("movie", options).await.unwrap();

    // Two pages of the same list collapse into one result per item id
    assert_eq!(transport.calls(), 2);
    assert_eq!(response.total, 1);
    assert_eq!(response.results[0].id, "panlist-r1");
}

#[test]
fn test_disabled_sources_are_counted_but_not_registered() {
    let file = sources_file();
    let registry = file.registry().unwrap();

    assert_eq!(file.sources.len(), 3);
    assert_eq!(file.sources.iter().filter(|s| !s.enabled).count(), 1);
    assert_eq!(registry.len(), 2);
    assert!(file.pattern_table().unwrap().is_excluded(ProviderType::Magnet));
}
