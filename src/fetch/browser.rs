//! Chromium-driven fetcher using chromiumoxide.
//!
//! One browser is launched per target run, with two tabs:
//!
//! - the listing tab loads listing pages and is the live page behind
//!   [`PageDriver`], so load-more and scroll pagination act on it
//! - the reader tab loads articles, leaving the listing where it was
//!
//! Navigations are serialised. After each one the document status is checked
//! against the retry policy, then the fetcher polls for a readiness marker
//! (a CSS selector) before handing the rendered HTML back.

use super::retry::{AttemptError, RetryPolicy};
use super::{Fetcher, PageDriver, RateLimiter};
use crate::config::CrawlTarget;
use crate::error::{FetchError, SessionError};
use crate::models::FetchResult;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

const MARKER_POLL: Duration = Duration::from_millis(250);

pub struct BrowserFetcher {
    browser: Browser,
    handler: JoinHandle<()>,
    listing: Page,
    reader: Page,
    limiter: RateLimiter,
    retry: RetryPolicy,
    wait_timeout: Duration,
    navigation: Mutex<()>,
}

impl BrowserFetcher {
    /// Launch Chromium and open the tabs used for the whole run.
    #[instrument(level = "info", skip_all, fields(target = %target.name, headless = target.headless))]
    pub async fn launch(target: &CrawlTarget) -> Result<Self, SessionError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(Duration::from_secs(target.retry.timeout_seconds))
            .window_size(1920, 1080)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-notifications");
        if !target.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &target.browser.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(SessionError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Browser(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
        });

        let (listing, reader) = match open_tabs(&browser).await {
            Ok(tabs) => tabs,
            Err(e) => {
                handler.abort();
                return Err(SessionError::Browser(e.to_string()));
            }
        };
        if let Some(agent) = &target.user_agent {
            for page in [&listing, &reader] {
                if let Err(e) = page.set_user_agent(agent.as_str()).await {
                    warn!(error = %e, "Failed to set user agent; keeping browser default");
                }
            }
        }

        info!("Browser session ready");
        Ok(Self {
            browser,
            handler,
            listing,
            reader,
            limiter: RateLimiter::new(target.rate_limit()),
            retry: RetryPolicy::from_config(&target.retry),
            wait_timeout: Duration::from_secs(target.browser.wait_timeout_seconds),
            navigation: Mutex::new(()),
        })
    }

    /// Close the browser and stop its event handler.
    pub async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser did not close cleanly");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Failed to reap browser process");
        }
        self.handler.abort();
        info!("Browser session closed");
    }

    async fn navigate(
        &self,
        page: &Page,
        url: &str,
        marker: Option<&str>,
    ) -> Result<FetchResult, FetchError> {
        let _tab = self.navigation.lock().await;

        let status = self
            .retry
            .run(url, &self.limiter, |_| async move {
                page.goto(url)
                    .await
                    .map_err(|e| AttemptError::Transient(e.to_string()))?;
                let request = page
                    .wait_for_navigation_response()
                    .await
                    .map_err(|e| AttemptError::Transient(e.to_string()))?;
                let status = request
                    .as_ref()
                    .and_then(|r| r.response.as_ref())
                    .map(|r| r.status);
                document_status(&self.retry, url, status)
            })
            .await?;

        if let Some(marker) = marker {
            self.wait_for(page, url, marker).await?;
        }

        let html = page.content().await.map_err(browser_error)?;
        let final_url = page
            .url()
            .await
            .unwrap_or_default()
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());

        debug!(%url, status, bytes = html.len(), "Rendered page");
        Ok(FetchResult {
            url: final_url,
            status,
            body: (!html.trim().is_empty()).then_some(html),
        })
    }

    async fn wait_for(&self, page: &Page, url: &str, marker: &str) -> Result<(), FetchError> {
        let started = Instant::now();
        loop {
            if page.find_element(marker).await.is_ok() {
                debug!(%marker, waited_ms = started.elapsed().as_millis() as u64, "Marker present");
                return Ok(());
            }
            if started.elapsed() >= self.wait_timeout {
                return Err(FetchError::MarkerTimeout {
                    url: url.to_string(),
                    marker: marker.to_string(),
                    waited_ms: started.elapsed().as_millis(),
                });
            }
            sleep(MARKER_POLL).await;
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, FetchError> {
        self.listing
            .evaluate(script)
            .await
            .map_err(browser_error)?
            .into_value::<T>()
            .map_err(|e| FetchError::Browser(format!("unexpected script result: {e}")))
    }
}

impl Drop for BrowserFetcher {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.navigate(&self.listing, url, None).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_until(&self, url: &str, marker: &str) -> Result<FetchResult, FetchError> {
        self.navigate(&self.listing, url, Some(marker)).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_detail(&self, url: &str, marker: &str) -> Result<FetchResult, FetchError> {
        self.navigate(&self.reader, url, Some(marker)).await
    }

    fn driver(&self) -> Option<&dyn PageDriver> {
        Some(self)
    }
}

#[async_trait]
impl PageDriver for BrowserFetcher {
    async fn html(&self) -> Result<String, FetchError> {
        self.listing.content().await.map_err(browser_error)
    }

    async fn current_url(&self) -> Result<String, FetchError> {
        Ok(self
            .listing
            .url()
            .await
            .map_err(browser_error)?
            .map(|u| u.to_string())
            .unwrap_or_default())
    }

    async fn count(&self, selector: &str) -> Result<usize, FetchError> {
        let script = format!("document.querySelectorAll({}).length", js_string(selector));
        let n: f64 = self.eval(script).await?;
        Ok(n as usize)
    }

    async fn is_actionable(&self, selector: &str) -> Result<bool, FetchError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                const style = window.getComputedStyle(el);
                return !el.disabled
                    && el.getAttribute('aria-disabled') !== 'true'
                    && style.display !== 'none'
                    && style.visibility !== 'hidden'
                    && el.getClientRects().length > 0;
            }})()"#,
            sel = js_string(selector)
        );
        self.eval(script).await
    }

    async fn click(&self, selector: &str) -> Result<bool, FetchError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.scrollIntoView({{ block: 'center' }});
                el.click();
                return true;
            }})()"#,
            sel = js_string(selector)
        );
        self.eval(script).await
    }

    async fn scroll_to_bottom(&self) -> Result<(), FetchError> {
        self.listing
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map_err(browser_error)?;
        Ok(())
    }

    async fn document_height(&self) -> Result<u64, FetchError> {
        let height: f64 = self
            .eval(
                "Math.max(document.body.scrollHeight, document.documentElement.scrollHeight)"
                    .to_string(),
            )
            .await?;
        Ok(height as u64)
    }
}

async fn open_tabs(browser: &Browser) -> Result<(Page, Page), chromiumoxide::error::CdpError> {
    let listing = browser.new_page("about:blank").await?;
    let reader = browser.new_page("about:blank").await?;
    Ok((listing, reader))
}

/// Check the main document's status like an HTTP response.
///
/// Pages that loaded without a network response (`data:` URLs, some
/// cache hits) report `0`.
fn document_status(retry: &RetryPolicy, url: &str, status: Option<i64>) -> Result<u16, AttemptError> {
    let Some(status) = status else {
        return Ok(0);
    };
    let status = u16::try_from(status).unwrap_or(0);
    if status >= 400 {
        return Err(retry.status_error(url, status));
    }
    Ok(status)
}

fn browser_error(e: impl std::fmt::Display) -> FetchError {
    FetchError::Browser(e.to_string())
}

/// Quote a selector as a JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
