// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP fetching with bounded retries and exponential backoff
//!
//! The transport is injected through [`HttpTransport`]; [`ReqwestTransport`]
//! is the production implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::config::{FetchConfig, RetryPolicy};
use super::rate_limiter::FetchRateLimiter;
use super::types::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// One outbound request
///
/// Cloned for every attempt so retries never observe a mutated request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }
}

/// Raw transport response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Transport-level failures, all retryable
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// Capability to perform one HTTP request
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: FetchRequest) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: FetchRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout(request.timeout.as_millis() as u64)
            } else if e.is_connect() {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::Other(e.to_string())
            }
        };

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify)?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Whether a non-success status is worth another attempt
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

/// Fetcher applying one retry policy to every request
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    rate_limiter: FetchRateLimiter,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        policy: RetryPolicy,
        rate_limiter: FetchRateLimiter,
    ) -> Self {
        Self {
            transport,
            policy,
            rate_limiter,
        }
    }

    /// Build a fetcher over the default `reqwest` transport
    pub fn from_config(config: &FetchConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(&config.user_agent)?;
        let rate_limiter = FetchRateLimiter::new(config.rate_limit_per_minute);
        if !rate_limiter.is_unlimited() {
            info!(
                "Pacing fetches to {} requests per minute",
                rate_limiter.requests_per_minute()
            );
        }
        Ok(Self::new(Arc::new(transport), config.retry.clone(), rate_limiter))
    }

    /// Fetch a body, retrying transient failures
    pub async fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, FetchError> {
        match Url::parse(&request.url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return Err(FetchError::InvalidRequest {
                    url: request.url.clone(),
                    reason: format!("unsupported scheme {}", parsed.scheme()),
                })
            }
            Err(e) => {
                return Err(FetchError::InvalidRequest {
                    url: request.url.clone(),
                    reason: e.to_string(),
                })
            }
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_cause = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.policy.delay_for(attempt - 1);
                debug!(
                    "Retrying {} in {}ms (attempt {}/{})",
                    request.url,
                    delay.as_millis(),
                    attempt,
                    max_attempts
                );
                tokio::time::sleep(delay).await;
            }
            self.rate_limiter.wait().await;

            let outcome =
                tokio::time::timeout(request.timeout, self.transport.send(request.clone())).await;

            match outcome {
                Ok(Ok(response)) if (200..300).contains(&response.status) => {
                    debug!("Fetched {} bytes from {}", response.body.len(), request.url);
                    return Ok(response.body);
                }
                Ok(Ok(response)) if is_retryable_status(response.status) => {
                    last_cause = format!("HTTP {}", response.status);
                }
                Ok(Ok(response)) => {
                    return Err(FetchError::Rejected {
                        url: request.url.clone(),
                        status: response.status,
                    });
                }
                Ok(Err(e)) => {
                    last_cause = e.to_string();
                }
                Err(_) => {
                    last_cause =
                        TransportError::Timeout(request.timeout.as_millis() as u64).to_string();
                }
            }

            warn!(
                "Fetch attempt {}/{} for {} failed: {}",
                attempt, max_attempts, request.url, last_cause
            );
        }

        Err(FetchError::Exhausted {
            url: request.url.clone(),
            attempts: max_attempts,
            last_cause,
        })
    }
}
