// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Scripted transport and orchestrator builders shared by the search tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use netdisk_search::search::fetcher::TransportError;
use netdisk_search::search::rate_limiter::FetchRateLimiter;
use netdisk_search::search::{
    FetchRequest, Fetcher, HttpResponse, HttpTransport, PatternTable, RequestTemplate,
    RetryPolicy, SearchConfig, SearchOrchestrator, SourceRegistry, TextAdapter,
};

type Responder = dyn Fn(&FetchRequest) -> Result<HttpResponse, TransportError> + Send + Sync;
type DelayFn = dyn Fn(&FetchRequest) -> Duration + Send + Sync;

/// Transport answering every request from a closure, optionally after a delay
pub struct ScriptedTransport {
    responder: Box<Responder>,
    delay: Box<DelayFn>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(
        responder: impl Fn(&FetchRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: Box::new(|_| Duration::ZERO),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_fn(move |_| delay)
    }

    /// Delay chosen per request
    pub fn with_delay_fn(
        mut self,
        delay: impl Fn(&FetchRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: FetchRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = (self.delay)(&request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.responder)(&request)
    }
}

pub fn ok(body: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status: 200,
        body: body.as_bytes().to_vec(),
    })
}

pub fn status(code: u16) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status: code,
        body: Vec::new(),
    })
}

/// Config with a single fast attempt per fetch
pub fn test_config() -> SearchConfig {
    let mut config = SearchConfig::default();
    config.fetch.retry = RetryPolicy {
        max_attempts: 1,
        base_delay_ms: 1,
        max_delay_ms: 1,
    };
    config.batch_deadline_ms = 2000;
    config
}

/// Text sources named `names`, queried at `https://{name}.example/s?q=...`
pub fn text_sources(names: &[&str]) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for (i, name) in names.iter().enumerate() {
        registry
            .register(Arc::new(TextAdapter::new(
                *name,
                i as u8,
                RequestTemplate::get(format!("https://{}.example/s?q={{keyword}}", name)),
            )))
            .unwrap();
    }
    registry
}

pub fn build_orchestrator(
    transport: Arc<ScriptedTransport>,
    registry: SourceRegistry,
    config: SearchConfig,
) -> SearchOrchestrator {
    build_orchestrator_with_patterns(transport, registry, config, PatternTable::default())
}

pub fn build_orchestrator_with_patterns(
    transport: Arc<ScriptedTransport>,
    registry: SourceRegistry,
    config: SearchConfig,
    patterns: PatternTable,
) -> SearchOrchestrator {
    let fetcher = Fetcher::new(
        transport,
        config.fetch.retry.clone(),
        FetchRateLimiter::new(0),
    );
    SearchOrchestrator::new(config, fetcher, patterns, registry)
}
