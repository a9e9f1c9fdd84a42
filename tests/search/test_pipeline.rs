// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Extraction, credential resolution and association over realistic text
use chrono::Utc;

use netdisk_search::search::associator::associate;
use netdisk_search::search::credentials::resolve_credentials;
use netdisk_search::search::extractor::extract_links;
use netdisk_search::search::orchestrator::build_result;
use netdisk_search::search::types::RawDocument;
use netdisk_search::search::{
    LinkOrigin, PatternTable, ProviderType, ScoringWeights, SearchOptions,
};

fn document(text: &str) -> RawDocument {
    RawDocument {
        source: "forum".to_string(),
        unique_id: "42".to_string(),
        title: "post".to_string(),
        content: String::new(),
        text: text.to_string(),
        published_at: None,
        fetched_at: Utc::now(),
    }
}

const POST: &str = "【合集】流浪地球1-2 4K\n\
百度网盘：https://pan.baidu.com/s/1AbCdEfGh 提取码：x7k2\n\
夸克网盘：https://pan.quark.cn/s/9f8e7d6c5b4a\n\
阿里云盘：https://www.aliyundrive.com/s/QwErTy12345 密码: a1b2\n\
磁力：magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567\n";

#[test]
fn test_forum_post_with_several_providers() {
    let result = build_result(
        &document(POST),
        &PatternTable::default(),
        &ScoringWeights::default(),
        &SearchOptions::default(),
    );

    assert_eq!(result.id, "forum-42");
    let summary: Vec<_> = result
        .links
        .iter()
        .map(|l| (l.provider_type, l.password.as_deref(), l.origin))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ProviderType::Baidu, Some("x7k2"), LinkOrigin::Associated),
            (ProviderType::Quark, None, LinkOrigin::None),
            (ProviderType::Aliyun, Some("a1b2"), LinkOrigin::Associated),
            (ProviderType::Magnet, None, LinkOrigin::None),
        ]
    );
    assert_eq!(
        result.links[3].url,
        "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567"
    );
}

#[test]
fn test_code_goes_to_the_nearest_preceding_link() {
    let first = "https://pan.quark.cn/s/aaaa1111";
    let second = "https://pan.quark.cn/s/bbbb2222";
    let filler = "这是第一个资源的介绍，内容比较长，用来把两个链接隔开足够远的距离。";
    let text = format!("{first} {filler}\n{second} 提取码: 8f2k");

    let table = PatternTable::default();
    let links = extract_links(&text, &table);
    let credentials = resolve_credentials(&text, &table.general_credential_rule());
    let resolved = associate(&links, &credentials, &text, &table, &ScoringWeights::default());

    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[0].link.url, first);
    assert_eq!(resolved[0].password, None);
    assert_eq!(resolved[1].link.url, second);
    assert_eq!(resolved[1].password.as_deref(), Some("8f2k"));
}

#[test]
fn test_inline_code_wins_and_duplicates_collapse() {
    let text = "A: https://pan.quark.cn/s/abc123?pwd=QQQQ 提取码: zzzz\n\
                B: https://pan.quark.cn/s/abc123 again";
    let result = build_result(
        &document(text),
        &PatternTable::default(),
        &ScoringWeights::default(),
        &SearchOptions::default(),
    );

    assert_eq!(result.links.len(), 1);
    let link = &result.links[0];
    assert_eq!(link.url, "https://pan.quark.cn/s/abc123");
    assert_eq!(link.password.as_deref(), Some("QQQQ"));
    assert_eq!(link.origin, LinkOrigin::Inline);
}

#[test]
fn test_enabled_providers_filter_records() {
    let options = SearchOptions {
        enabled_providers: Some(vec![ProviderType::Aliyun]),
        ..Default::default()
    };
    let result = build_result(
        &document(POST),
        &PatternTable::default(),
        &ScoringWeights::default(),
        &options,
    );
    assert_eq!(result.links.len(), 1);
    assert_eq!(result.links[0].provider_type, ProviderType::Aliyun);
    // Filtering happens after association, so the code still lands correctly
    assert_eq!(result.links[0].password.as_deref(), Some("a1b2"));
}

#[test]
fn test_excluded_provider_never_reported() {
    let table = PatternTable::default().with_excluded([ProviderType::Magnet]);
    let result = build_result(
        &document(POST),
        &table,
        &ScoringWeights::default(),
        &SearchOptions::default(),
    );
    assert!(result
        .links
        .iter()
        .all(|l| l.provider_type != ProviderType::Magnet));
    assert_eq!(result.links.len(), 3);
}

#[test]
fn test_offsets_stay_on_char_boundaries() {
    let inputs = [
        "🙂https://pan.baidu.com/s/1abc。提取码：ab12🙂",
        "（https://pan.quark.cn/s/xyz789）密码　cd34」",
        "https://pan.baidu.com/s/1abc</a><br>pwd=ef56&nbsp;",
        "链接:https://cloud.189.cn/t/AbCd（访问码：x9y8）",
        "",
        "提取码",
        "https://",
        "魔法🙂🙂🙂 code: 1234 https://drive.uc.cn/s/ff00",
    ];
    let table = PatternTable::default();

    for text in inputs {
        for link in extract_links(text, &table) {
            assert!(link.start < link.end && link.end <= text.len(), "{text}");
            assert!(text.is_char_boundary(link.start) && text.is_char_boundary(link.end));
            assert_eq!(&text[link.start..link.end], link.url);
        }
        for cred in resolve_credentials(text, &table.general_credential_rule()) {
            assert!(cred.start < cred.end && cred.end <= text.len(), "{text}");
            assert!(text.is_char_boundary(cred.start) && text.is_char_boundary(cred.end));
            assert_eq!(&text[cred.start..cred.end], cred.value);
        }
    }
}

#[test]
fn test_markup_is_trimmed_from_links() {
    let text = r#"<a href="https://pan.baidu.com/s/1xyz">https://pan.baidu.com/s/1xyz</a><br>提取码: 9k9k"#;
    let result = build_result(
        &document(text),
        &PatternTable::default(),
        &ScoringWeights::default(),
        &SearchOptions::default(),
    );

    assert_eq!(result.links.len(), 1);
    assert_eq!(result.links[0].url, "https://pan.baidu.com/s/1xyz");
    assert_eq!(result.links[0].password.as_deref(), Some("9k9k"));
}
