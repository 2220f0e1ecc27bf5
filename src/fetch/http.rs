//! Plain HTTP fetcher built on reqwest.

use super::retry::{AttemptError, RetryPolicy};
use super::{Fetcher, RateLimiter};
use crate::config::CrawlTarget;
use crate::error::{FetchError, SessionError};
use crate::models::FetchResult;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::error::Error as _;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Browser-like User-Agent sent unless the target overrides it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl HttpFetcher {
    /// Build the HTTP session for one target run.
    pub fn new(target: &CrawlTarget) -> Result<Self, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(target.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))
            .default_headers(headers)
            .timeout(Duration::from_secs(target.retry.timeout_seconds))
            .build()?;

        Ok(Self::with_client(
            client,
            target.rate_limit(),
            RetryPolicy::from_config(&target.retry),
        ))
    }

    pub fn with_client(client: reqwest::Client, rate_limit: Duration, retry: RetryPolicy) -> Self {
        Self {
            client,
            limiter: RateLimiter::new(rate_limit),
            retry,
        }
    }

    async fn attempt(&self, url: &str) -> Result<FetchResult, AttemptError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            let final_url = response.url().to_string();
            let body = response.text().await.map_err(|e| classify(url, e))?;
            debug!(%url, status, bytes = body.len(), "Fetched page");
            return Ok(FetchResult {
                url: final_url,
                status,
                body: (!body.trim().is_empty()).then_some(body),
            });
        }

        Err(self.retry.status_error(url, status))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        self.retry
            .run(url, &self.limiter, |_| self.attempt(url))
            .await
    }
}

/// Sort a reqwest failure into retryable or not.
fn classify(url: &str, e: reqwest::Error) -> AttemptError {
    if is_dns_failure(&e) {
        return AttemptError::Permanent(FetchError::Request {
            url: url.to_string(),
            source: e,
        });
    }
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        return AttemptError::Transient(e.to_string());
    }
    AttemptError::Permanent(FetchError::Request {
        url: url.to_string(),
        source: e,
    })
}

fn is_dns_failure(e: &reqwest::Error) -> bool {
    let mut source = e.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return true;
        }
        source = inner.source();
    }
    false
}
