//! Concurrent, failure-isolated fetching of every configured source.
//!
//! Each source is fetched in its own task; the caller waits for all of them
//! and gets exactly one [`FetchOutcome`] per source, in input order.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::FetchPolicy;
use crate::types::{FetchError, FetchOutcome, Source};

/// Header carrying the upstream API key, as the upstream proxy expects it.
pub const API_KEY_HEADER: &str = "apiKey";

/// One GET returning a JSON body. Implementations perform a single attempt;
/// timeouts and retries are applied by [`Fetcher`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, source: &Source) -> Result<Value, FetchError>;
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// reqwest-backed transport used in production.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    env: EnvLookup,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("course-stats/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, env: Arc::new(|key| std::env::var(key).ok()) })
    }

    /// Replaces the process environment as the source of `api_key_env` values.
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, source: &Source) -> Result<Value, FetchError> {
        debug!(source = %source.id, url = %source.url, "GET");
        let mut request = self.http.get(&source.url).header("Accept", "application/json");
        if let Some(var) = &source.api_key_env {
            match (self.env)(var) {
                Some(key) => request = request.header(API_KEY_HEADER, key),
                None => warn!(source = %source.id, env = %var, "api key variable not set, sending request without it"),
            }
        }

        let response = request.send().await.map_err(|e| FetchError::Network(e.to_string()))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| FetchError::Network(e.to_string()))?;

        // Any completed response with a JSON body is a payload, whatever its status.
        match serde_json::from_slice(&body) {
            Ok(payload) => {
                if !status.is_success() {
                    warn!(source = %source.id, status = status.as_u16(), "upstream returned an error status with a JSON body");
                }
                Ok(payload)
            }
            Err(_) if !status.is_success() => Err(FetchError::HttpStatus { status: status.as_u16() }),
            Err(e) => Err(FetchError::Decode(e.to_string())),
        }
    }
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: FetchPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: FetchPolicy) -> Self {
        Self { transport, policy }
    }

    /// Launches every source before awaiting any and waits for all of them.
    /// A failing or panicking source never affects its siblings.
    pub async fn fetch_all(&self, sources: &[Source]) -> Vec<FetchOutcome> {
        let handles: Vec<_> = sources
            .iter()
            .cloned()
            .map(|source| {
                let transport = Arc::clone(&self.transport);
                let policy = self.policy;
                tokio::spawn(async move { fetch_with_retry(transport.as_ref(), &source, &policy).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(sources)
            .map(|(joined, source)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(source = %source.id, error = %e, "fetch task did not complete");
                    FetchOutcome::Failure(FetchError::TaskFailed(e.to_string()))
                }
            })
            .collect()
    }

    pub async fn fetch_one(&self, source: &Source) -> FetchOutcome {
        fetch_with_retry(self.transport.as_ref(), source, &self.policy).await
    }
}

async fn fetch_with_retry(transport: &dyn Transport, source: &Source, policy: &FetchPolicy) -> FetchOutcome {
    let mut retry = 0u32;
    loop {
        let start = Instant::now();
        let res = match tokio::time::timeout(policy.timeout(), transport.get_json(source)).await {
            Ok(r) => r,
            Err(_) => Err(FetchError::Timeout(policy.timeout_ms)),
        };
        warn_if_slow(source, start, policy);

        match res {
            Ok(payload) => {
                debug!(source = %source.id, attempt = retry + 1, "source fetched");
                return FetchOutcome::Success(payload);
            }
            Err(e) if e.is_retryable() && retry < policy.retries => {
                retry += 1;
                let delay = policy.backoff(retry);
                warn!(
                    source = %source.id,
                    attempt = retry,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(source = %source.id, url = %source.url, error = %e, "source failed, falling back");
                return FetchOutcome::Failure(e);
            }
        }
    }
}

fn warn_if_slow(source: &Source, start: Instant, policy: &FetchPolicy) {
    let elapsed = start.elapsed();
    if elapsed > policy.slow_warn() {
        warn!(source = %source.id, elapsed_ms = elapsed.as_millis() as u64, "slow upstream response");
    }
}
