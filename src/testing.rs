//! Shared test fixtures: a canonical target, an in-memory fetcher, a fake
//! browser page and a fake browser session tying the two together.

use crate::config::CrawlTarget;
use crate::error::FetchError;
use crate::fetch::{Fetcher, PageDriver};
use crate::models::FetchResult;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub(crate) const TARGET_YAML: &str = r#"
name: Test Times
base_urls: ["https://news.test/search?s={keyword}"]
keywords: ["BSP", "GCash"]
rate_limit_seconds: 0
page_delay_seconds: 0
max_pages: 5
date_format: "%B %d, %Y"
pagination:
  kind: next_link
  params:
    container: "nav.pagination"
selectors:
  listing:
    item: "article.post"
    title: "h2.entry-title a"
    date: "span.meta-date"
    summary: "div.entry-summary"
  article:
    headline: "h1.entry-title"
    byline: "a.author"
    date: "time.published"
    section: "span.section"
    content: "div.entry-content"
"#;

/// The target every engine test starts from; tweak fields as needed.
pub(crate) fn news_target() -> CrawlTarget {
    serde_yaml::from_str(TARGET_YAML).expect("fixture target parses")
}

/// Listing page in the fixture target's markup.
///
/// Each entry is `(title, url, summary)`; `next` adds a pagination link.
pub(crate) fn listing_html(entries: &[(&str, &str, &str)], next: Option<&str>) -> String {
    let articles: String = entries
        .iter()
        .map(|(title, url, summary)| {
            format!(
                r#"<article class="post"><h2 class="entry-title"><a href="{url}">{title}</a></h2><span class="meta-date">October 3, 2024</span><div class="entry-summary">{summary}</div></article>"#
            )
        })
        .collect();
    let nav = next
        .map(|href| format!(r#"<nav class="pagination"><span class="current">1</span><a href="{href}">Next</a></nav>"#))
        .unwrap_or_else(|| r#"<nav class="pagination"><span class="current">1</span></nav>"#.to_string());
    format!("<html><body><main>{articles}</main>{nav}</body></html>")
}

/// Article page in the fixture target's markup.
pub(crate) fn article_html(headline: &str, paragraphs: &[&str]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>")).collect();
    format!(
        r#"<html><body><span class="section">Business</span><h1 class="entry-title">{headline}</h1><a class="author">Maria Santos</a><time class="published">October 3, 2024</time><div class="entry-content">{body}</div></body></html>"#
    )
}

/// Serves canned HTML by URL; anything else is a 404.
#[derive(Default)]
pub(crate) struct StaticFetcher {
    pages: HashMap<String, String>,
    failing: HashMap<String, u16>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub(crate) fn with_status(mut self, url: &str, status: u16) -> Self {
        self.failing.insert(url.to_string(), status);
        self
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    fn page(&self, url: &str) -> Option<&str> {
        self.pages.get(url).map(String::as_str)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        if let Some(status) = self.failing.get(url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            });
        }
        match self.pages.get(url) {
            Some(html) => Ok(FetchResult {
                url: url.to_string(),
                status: 200,
                body: Some(html.clone()),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// A page that grows by a queued number of items per click or scroll.
pub(crate) struct FakeDriver {
    dom: Mutex<FakeDom>,
}

struct FakeDom {
    items: usize,
    batches: VecDeque<usize>,
    stuck_button: bool,
    clicks: usize,
    scrolls: usize,
}

impl FakeDriver {
    pub(crate) fn new(items: usize, batches: impl IntoIterator<Item = usize>) -> Self {
        Self {
            dom: Mutex::new(FakeDom {
                items,
                batches: batches.into_iter().collect(),
                stuck_button: false,
                clicks: 0,
                scrolls: 0,
            }),
        }
    }

    /// Keep the button clickable after the batches run out.
    pub(crate) fn with_stuck_button(self) -> Self {
        self.dom.lock().unwrap().stuck_button = true;
        self
    }

    pub(crate) fn clicks(&self) -> usize {
        self.dom.lock().unwrap().clicks
    }

    pub(crate) fn scrolls(&self) -> usize {
        self.dom.lock().unwrap().scrolls
    }

    fn grow(dom: &mut FakeDom) {
        if let Some(n) = dom.batches.pop_front() {
            dom.items += n;
        }
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn html(&self) -> Result<String, FetchError> {
        let dom = self.dom.lock().unwrap();
        let items: String = (1..=dom.items)
            .map(|i| {
                format!(
                    r#"<li class="item"><a href="https://news.test/a{i}">Payment story {i}</a></li>"#
                )
            })
            .collect();
        Ok(format!(
            r#"<html><body><ul class="feed">{items}</ul><button class="more">Load more</button></body></html>"#
        ))
    }

    async fn current_url(&self) -> Result<String, FetchError> {
        Ok("https://news.test/feed".to_string())
    }

    async fn count(&self, _selector: &str) -> Result<usize, FetchError> {
        Ok(self.dom.lock().unwrap().items)
    }

    async fn is_actionable(&self, _selector: &str) -> Result<bool, FetchError> {
        let dom = self.dom.lock().unwrap();
        Ok(dom.stuck_button || !dom.batches.is_empty())
    }

    async fn click(&self, _selector: &str) -> Result<bool, FetchError> {
        let mut dom = self.dom.lock().unwrap();
        dom.clicks += 1;
        Self::grow(&mut dom);
        Ok(true)
    }

    async fn scroll_to_bottom(&self) -> Result<(), FetchError> {
        let mut dom = self.dom.lock().unwrap();
        dom.scrolls += 1;
        Self::grow(&mut dom);
        Ok(())
    }

    async fn document_height(&self) -> Result<u64, FetchError> {
        Ok(self.dom.lock().unwrap().items as u64 * 120)
    }
}

/// A browser session with a listing tab and a reader tab.
///
/// `fetch`/`fetch_until` navigate the listing tab, which is also the live
/// page behind [`Fetcher::driver`]. Only while it shows `feed_url` does the
/// driver act on the growing [`FakeDriver`] feed; anywhere else it sees the
/// static page at that location, with nothing to click or scroll.
pub(crate) struct FakeBrowser {
    pages: StaticFetcher,
    feed: FakeDriver,
    feed_url: String,
    location: Mutex<String>,
}

impl FakeBrowser {
    pub(crate) fn new(feed_url: &str, feed: FakeDriver, pages: StaticFetcher) -> Self {
        Self {
            pages,
            feed,
            feed_url: feed_url.to_string(),
            location: Mutex::new("about:blank".to_string()),
        }
    }

    pub(crate) fn feed(&self) -> &FakeDriver {
        &self.feed
    }

    pub(crate) fn request_count(&self, url: &str) -> usize {
        self.pages.request_count(url)
    }

    fn on_feed(&self) -> bool {
        *self.location.lock().unwrap() == self.feed_url
    }
}

#[async_trait]
impl Fetcher for FakeBrowser {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        *self.location.lock().unwrap() = url.to_string();
        if url == self.feed_url {
            return Ok(FetchResult {
                url: url.to_string(),
                status: 200,
                body: Some(self.feed.html().await?),
            });
        }
        self.pages.fetch(url).await
    }

    async fn fetch_detail(&self, url: &str, _marker: &str) -> Result<FetchResult, FetchError> {
        self.pages.fetch(url).await
    }

    fn driver(&self) -> Option<&dyn PageDriver> {
        Some(self)
    }
}

#[async_trait]
impl PageDriver for FakeBrowser {
    async fn html(&self) -> Result<String, FetchError> {
        if self.on_feed() {
            return self.feed.html().await;
        }
        let location = self.location.lock().unwrap().clone();
        Ok(self.pages.page(&location).unwrap_or_default().to_string())
    }

    async fn current_url(&self) -> Result<String, FetchError> {
        Ok(self.location.lock().unwrap().clone())
    }

    async fn count(&self, selector: &str) -> Result<usize, FetchError> {
        if self.on_feed() {
            return self.feed.count(selector).await;
        }
        Ok(0)
    }

    async fn is_actionable(&self, selector: &str) -> Result<bool, FetchError> {
        if self.on_feed() {
            return self.feed.is_actionable(selector).await;
        }
        Ok(false)
    }

    async fn click(&self, selector: &str) -> Result<bool, FetchError> {
        if self.on_feed() {
            return self.feed.click(selector).await;
        }
        Ok(false)
    }

    async fn scroll_to_bottom(&self) -> Result<(), FetchError> {
        if self.on_feed() {
            return self.feed.scroll_to_bottom().await;
        }
        Ok(())
    }

    async fn document_height(&self) -> Result<u64, FetchError> {
        if self.on_feed() {
            return self.feed.document_height().await;
        }
        Ok(900)
    }
}
