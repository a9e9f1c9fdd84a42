// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use netdisk_search::search::fetcher::TransportError;
use netdisk_search::search::{
    LinkOrigin, ProviderType, RequestTemplate, SearchError, SearchOptions, SourceRegistry,
    TextAdapter,
};

use super::helpers::{build_orchestrator, ok, status, test_config, text_sources, ScriptedTransport};

const GOOD_BODY: &str = "资源合集\n链接: https://pan.baidu.com/s/1AbCdEf 提取码: 8f2k";

#[tokio::test]
async fn test_every_task_failing_is_a_hard_error() {
    let transport = Arc::new(ScriptedTransport::new(|_| {
        Err(TransportError::Connect("refused".to_string()))
    }));
    let orchestrator = build_orchestrator(
        transport.clone(),
        text_sources(&["a", "b", "c", "d", "e"]),
        test_config(),
    );

    let err = orchestrator
        .search("movie", SearchOptions::default())
        .await
        .unwrap_err();

    match err {
        SearchError::AllFailed { failures } => {
            assert_eq!(failures.len(), 5);
            assert!(failures.iter().all(|f| f.cause.contains("refused")));
        }
        other => panic!("expected AllFailed, got {other:?}"),
    }
    assert_eq!(transport.calls(), 5);
}

#[tokio::test]
async fn test_one_success_out_of_five() {
    let transport = Arc::new(ScriptedTransport::new(|req| {
        if req.url.starts_with("https://c.example/") {
            ok(GOOD_BODY)
        } else {
            status(503)
        }
    }));
    let orchestrator = build_orchestrator(
        transport,
        text_sources(&["a", "b", "c", "d", "e"]),
        test_config(),
    );

    let response = orchestrator
        .search("movie", SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(response.total, 1);
    assert_eq!(response.failures.len(), 4);
    assert!(!response.timed_out);

    let result = &response.results[0];
    assert_eq!(result.id, "c-1");
    assert_eq!(result.links.len(), 1);
    assert_eq!(result.links[0].provider_type, ProviderType::Baidu);
    assert_eq!(result.links[0].password.as_deref(), Some("8f2k"));
    assert_eq!(result.links[0].origin, LinkOrigin::Associated);
}

#[tokio::test]
async fn test_cache_hit_skips_fetching() {
    let transport = Arc::new(ScriptedTransport::new(|_| ok(GOOD_BODY)));
    let orchestrator = build_orchestrator(transport.clone(), text_sources(&["a", "b"]), test_config());

    let first = orchestrator
        .search("movie", SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(transport.calls(), 2);
    assert!(!first.cached);

    let second = orchestrator
        .search("movie", SearchOptions::default())
        .await
        .unwrap();
    assert!(second.cached);
    assert_eq!(second.results, first.results);
    assert_eq!(transport.calls(), 2);

    // Different options are a different cache entry
    let filtered = orchestrator
        .search(
            "movie",
            SearchOptions {
                disabled_providers: vec![ProviderType::Quark],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!filtered.cached);
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn test_clear_cache_forces_refetch() {
    let transport = Arc::new(ScriptedTransport::new(|_| ok(GOOD_BODY)));
    let orchestrator = build_orchestrator(transport.clone(), text_sources(&["a"]), test_config());

    orchestrator.search("movie", SearchOptions::default()).await.unwrap();
    orchestrator.clear_cache();
    let again = orchestrator.search("movie", SearchOptions::default()).await.unwrap();

    assert!(!again.cached);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_batch_deadline_returns_partial_results() {
    // The fast source answers immediately; the slow one outlives the deadline
    let transport = Arc::new(
        ScriptedTransport::new(|req| {
            if req.url.starts_with("https://fast.example/") {
                ok(GOOD_BODY)
            } else {
                ok("https://pan.quark.cn/s/late123")
            }
        })
        .with_delay_fn(|req| {
            if req.url.starts_with("https://slow.example/") {
                Duration::from_secs(10)
            } else {
                Duration::ZERO
            }
        }),
    );
    let mut config = test_config();
    config.batch_deadline_ms = 200;
    config.fetch.request_timeout_ms = 30_000;
    let orchestrator = build_orchestrator(transport, text_sources(&["fast", "slow"]), config);

    let started = Instant::now();
    let response = orchestrator
        .search("movie", SearchOptions::default())
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(response.timed_out);
    assert_eq!(response.total, 1);
    assert_eq!(response.results[0].id, "fast-1");
    // Timed-out sets are not cached
    assert_eq!(orchestrator.cache_stats().total, 0);
}

#[tokio::test]
async fn test_deadline_with_no_finished_task_is_not_an_error() {
    let transport = Arc::new(
        ScriptedTransport::new(|_| ok(GOOD_BODY)).with_delay(Duration::from_secs(10)),
    );
    let mut config = test_config();
    config.batch_deadline_ms = 100;
    config.fetch.request_timeout_ms = 30_000;
    let orchestrator = build_orchestrator(transport, text_sources(&["a", "b"]), config);

    let response = orchestrator
        .search("movie", SearchOptions::default())
        .await
        .unwrap();
    assert!(response.timed_out);
    assert!(response.results.is_empty());
    assert_eq!(orchestrator.limiter_snapshot().in_flight, 0);
}

#[tokio::test]
async fn test_concurrency_limit_bounds_in_flight_fetches() {
    let transport = Arc::new(
        ScriptedTransport::new(|_| ok(GOOD_BODY)).with_delay(Duration::from_millis(50)),
    );
    let mut config = test_config();
    config.concurrency.min_limit = 2;
    config.concurrency.max_limit = 2;
    config.concurrency.initial_limit = 2;
    let orchestrator = build_orchestrator(
        transport.clone(),
        text_sources(&["a", "b", "c", "d", "e", "f"]),
        config,
    );

    let response = orchestrator
        .search("movie", SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(response.total, 6);
    assert_eq!(transport.calls(), 6);
    assert!(transport.max_in_flight() <= 2);
    assert_eq!(orchestrator.limiter_snapshot().in_flight, 0);
}

#[tokio::test]
async fn test_slow_batch_shrinks_concurrency_limit() {
    let transport = Arc::new(
        ScriptedTransport::new(|_| ok(GOOD_BODY)).with_delay(Duration::from_millis(150)),
    );
    let mut config = test_config();
    config.batch_deadline_ms = 10_000;
    config.concurrency.min_limit = 1;
    config.concurrency.max_limit = 16;
    config.concurrency.initial_limit = 8;
    config.concurrency.step = 2;
    config.concurrency.latency_threshold_ms = 50;
    config.concurrency.adjust_interval_ms = 20;

    let names: Vec<String> = (0..16).map(|i| format!("s{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let orchestrator = build_orchestrator(transport, text_sources(&names), config);

    let background = orchestrator.spawn_background_tasks();
    let response = orchestrator
        .search("movie", SearchOptions::default())
        .await
        .unwrap();
    background.abort();

    assert_eq!(response.total, 16);
    let snapshot = orchestrator.limiter_snapshot();
    assert!(snapshot.limit < 8, "limit stayed at {}", snapshot.limit);
    assert!(snapshot.limit >= 1);
    assert_eq!(snapshot.in_flight, 0);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = attempts.clone();
    let transport = Arc::new(ScriptedTransport::new(move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            status(502)
        } else {
            ok(GOOD_BODY)
        }
    }));
    let mut config = test_config();
    config.fetch.retry.max_attempts = 3;
    let orchestrator = build_orchestrator(transport, text_sources(&["a"]), config);

    let response = orchestrator
        .search("movie", SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(response.total, 1);
    assert!(response.failures.is_empty());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_pages_become_separate_targets() {
    let transport = Arc::new(ScriptedTransport::new(|req| {
        let page = req.url.rsplit('=').next().unwrap_or("0").to_string();
        ok(&format!("第{}页 https://pan.quark.cn/s/page{}", page, page))
    }));
    let mut registry = SourceRegistry::new();
    registry
        .register(Arc::new(TextAdapter::new(
            "paged",
            1,
            RequestTemplate::get("https://paged.example/s?q={keyword}&page={page}"),
        )))
        .unwrap();
    let orchestrator = build_orchestrator(transport.clone(), registry, test_config());

    let response = orchestrator
        .search(
            "movie",
            SearchOptions {
                max_pages: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(transport.calls(), 3);
    let mut ids: Vec<_> = response.results.iter().map(|r| r.id.clone()).collect();
    ids.sort();
    assert_eq!(ids, vec!["paged-1", "paged-2", "paged-3"]);
}

#[tokio::test]
async fn test_results_without_links_are_dropped() {
    let transport = Arc::new(ScriptedTransport::new(|req| {
        if req.url.starts_with("https://a.example/") {
            ok("nothing to see here")
        } else {
            ok("https://pan.quark.cn/s/abc123")
        }
    }));
    let orchestrator = build_orchestrator(transport, text_sources(&["a", "b"]), test_config());

    let response = orchestrator
        .search("movie", SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(response.total, 1);
    assert_eq!(response.results[0].id, "b-1");
    assert!(response.failures.is_empty());
}

#[tokio::test]
async fn test_source_filter_limits_fan_out() {
    let transport = Arc::new(ScriptedTransport::new(|_| ok(GOOD_BODY)));
    let orchestrator =
        build_orchestrator(transport.clone(), text_sources(&["a", "b", "c"]), test_config());

    let response = orchestrator
        .search(
            "movie",
            SearchOptions {
                sources: Some(vec!["B".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(transport.calls(), 1);
    assert_eq!(response.results[0].id, "b-1");
}

#[tokio::test]
async fn test_response_serializes_camel_case() {
    let transport = Arc::new(ScriptedTransport::new(|_| ok(GOOD_BODY)));
    let orchestrator = build_orchestrator(transport, text_sources(&["a"]), test_config());

    let response = orchestrator
        .search("movie", SearchOptions::default())
        .await
        .unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["keyword"], "movie");
    assert_eq!(json["timedOut"], false);
    assert!(json.get("elapsedMs").is_some());
    assert!(json.get("failures").is_none());
    assert_eq!(json["results"][0]["links"][0]["providerType"], "baidu");
}
