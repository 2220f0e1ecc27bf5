//! Rate-limited, retrying fetch layer.
//!
//! Two session kinds implement [`Fetcher`]:
//!
//! | Engine | Type | Transport | Notes |
//! |--------|------|-----------|-------|
//! | `http` | [`HttpFetcher`] | reqwest | Status-aware retries |
//! | `browser` | [`BrowserFetcher`] | chromiumoxide | Waits for DOM markers, exposes a [`PageDriver`] |
//!
//! Both share the same politeness machinery:
//! - [`RateLimiter`]: minimum wall-clock gap between requests of one instance
//! - [`RetryPolicy`]: bounded exponential backoff with jitter

use crate::error::FetchError;
use crate::models::FetchResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::trace;

pub mod browser;
pub mod http;
pub mod retry;

pub use browser::BrowserFetcher;
pub use http::HttpFetcher;
pub use retry::RetryPolicy;

/// Request/response primitive shared by every crawl component.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, absorbing transient failures.
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError>;

    /// Fetch `url` and wait until `marker` matches an element.
    ///
    /// Plain HTTP has nothing to wait for, so the default ignores the marker.
    async fn fetch_until(&self, url: &str, _marker: &str) -> Result<FetchResult, FetchError> {
        self.fetch(url).await
    }

    /// Fetch an article page and wait for `marker`, leaving the page behind
    /// [`Fetcher::driver`] where it is.
    ///
    /// Sessions whose driver is a live page must load articles elsewhere, or
    /// in-place pagination would resume on the last article instead of the
    /// listing.
    async fn fetch_detail(&self, url: &str, marker: &str) -> Result<FetchResult, FetchError> {
        self.fetch_until(url, marker).await
    }

    /// Live-page controls, when the session renders pages in a browser.
    fn driver(&self) -> Option<&dyn PageDriver> {
        None
    }
}

/// Interaction with the page currently loaded in a browser session.
///
/// Used by pagination strategies that grow the page in place rather than
/// navigating to a new URL.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn html(&self) -> Result<String, FetchError>;

    async fn current_url(&self) -> Result<String, FetchError>;

    async fn count(&self, selector: &str) -> Result<usize, FetchError>;

    /// Whether the element exists, is displayed and is not disabled.
    async fn is_actionable(&self, selector: &str) -> Result<bool, FetchError>;

    /// Script-level click on the first match. `false` when nothing matched.
    async fn click(&self, selector: &str) -> Result<bool, FetchError>;

    async fn scroll_to_bottom(&self) -> Result<(), FetchError>;

    async fn document_height(&self) -> Result<u64, FetchError>;
}

/// Minimum interval between consecutive requests of one fetcher.
///
/// The timestamp is read and updated under one lock, so concurrent callers
/// queue up and are released one interval apart.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the interval since the previous request has elapsed.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                let pause = self.interval - elapsed;
                trace!(?pause, "Rate limiting request");
                sleep(pause).await;
            }
        }
        *last = Some(Instant::now());
    }
}
