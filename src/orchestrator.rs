//! The keyword × page crawl loop.
//!
//! One [`Orchestrator`] runs one target. For every keyword and base URL it
//! walks a small state machine:
//!
//! ```text
//! Idle ─▶ ListingFetch ─▶ Extracting ─▶ ArticleFetch ─▶ Recording ─▶ Paginating ─┬─▶ ListingFetch
//!              │                                                                  ├─▶ Extracting (in place)
//!              └──────────────────────────────▶ Done ◀────────────────────────────┘
//! ```
//!
//! - A failed listing fetch ends that keyword/base URL loop; siblings continue.
//! - A failed article fetch or extraction costs one item and is recorded as a skip.
//! - An article is accepted only if its [`DedupKey`](crate::dedup::DedupKey)
//!   has not been seen in this run.
//!
//! The [`Session`] (HTTP client or browser) is acquired once per target and
//! released on every exit path by [`crawl_target`].

use crate::config::{CrawlTarget, Engine};
use crate::dedup::DedupIndex;
use crate::error::{CrawlError, ExtractionError, FetchError, SessionError};
use crate::extract::{ArticleContext, ExtractorPipeline};
use crate::fetch::{BrowserFetcher, Fetcher, HttpFetcher, PageDriver};
use crate::models::{ArticleRecord, ListingItem};
use crate::pagination::{self, PageView, PaginationStrategy};
use crate::store::ArticleStore;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fmt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Why a keyword loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The pagination strategy found no further page.
    Exhausted,
    /// `max_pages` listing pages were visited.
    PageCeiling,
    Cancelled,
    ListingFailed(String),
    PaginationFailed(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exhausted => f.write_str("exhausted"),
            Termination::PageCeiling => f.write_str("page ceiling"),
            Termination::Cancelled => f.write_str("cancelled"),
            Termination::ListingFailed(reason) => write!(f, "listing fetch failed: {reason}"),
            Termination::PaginationFailed(reason) => write!(f, "pagination failed: {reason}"),
        }
    }
}

/// Why a matched candidate produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Fetch(String),
    EmptyBody,
    Extraction(ExtractionError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Fetch(reason) => write!(f, "fetch failed: {reason}"),
            SkipReason::EmptyBody => f.write_str("empty body"),
            SkipReason::Extraction(e) => write!(f, "extraction failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    pub url: String,
    pub reason: SkipReason,
}

/// Counters for one keyword on one base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordReport {
    pub keyword: String,
    pub base_url: String,
    /// Listing items that matched the keyword.
    pub matched: usize,
    /// Records appended to the store.
    pub extracted: usize,
    /// Matches whose dedup key was already taken.
    pub duplicates: usize,
    pub skipped: Vec<Skip>,
    /// Listing pages processed.
    pub pages: usize,
    pub termination: Termination,
}

impl KeywordReport {
    fn new(keyword: &str, base_url: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            base_url: base_url.to_string(),
            matched: 0,
            extracted: 0,
            duplicates: 0,
            skipped: Vec::new(),
            pages: 0,
            termination: Termination::Exhausted,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetReport {
    pub target: String,
    pub keywords: Vec<KeywordReport>,
}

impl TargetReport {
    pub fn extracted(&self) -> usize {
        self.keywords.iter().map(|k| k.extracted).sum()
    }

    pub fn duplicates(&self) -> usize {
        self.keywords.iter().map(|k| k.duplicates).sum()
    }

    pub fn skipped(&self) -> usize {
        self.keywords.iter().map(|k| k.skipped.len()).sum()
    }

    pub fn pages(&self) -> usize {
        self.keywords.iter().map(|k| k.pages).sum()
    }
}

impl fmt::Display for TargetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} extracted, {} duplicates, {} skipped, {} pages",
            self.target,
            self.extracted(),
            self.duplicates(),
            self.skipped(),
            self.pages()
        )?;
        for kw in &self.keywords {
            writeln!(
                f,
                "  {} @ {}: matched {}, extracted {}, duplicates {}, skipped {}, pages {} ({})",
                kw.keyword,
                kw.base_url,
                kw.matched,
                kw.extracted,
                kw.duplicates,
                kw.skipped.len(),
                kw.pages,
                kw.termination
            )?;
            for skip in &kw.skipped {
                writeln!(f, "    skipped {}: {}", skip.url, skip.reason)?;
            }
        }
        Ok(())
    }
}

/// A listing page as far as the loop is concerned.
struct ListingPage {
    url: String,
    html: String,
}

/// Loop states. Payloads carry what the next state needs.
enum Phase {
    Idle,
    ListingFetch(String),
    Extracting(ListingPage),
    ArticleFetch(ListingPage, Vec<ListingItem>),
    Recording(ListingPage, Vec<(String, Result<ArticleRecord, SkipReason>)>),
    Paginating(ListingPage),
    Done(Termination),
}

/// Drives one target's keyword loops against a fetcher.
pub struct Orchestrator<'a> {
    target: &'a CrawlTarget,
    pipeline: ExtractorPipeline,
    pagination: Box<dyn PaginationStrategy>,
    fetcher: &'a dyn Fetcher,
    cancel: CancellationToken,
    dedup: DedupIndex,
    store: ArticleStore,
    concurrency: usize,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        target: &'a CrawlTarget,
        pipeline: ExtractorPipeline,
        pagination: Box<dyn PaginationStrategy>,
        fetcher: &'a dyn Fetcher,
        cancel: CancellationToken,
    ) -> Self {
        let concurrency = if target.concurrency > 1
            && (target.engine == Engine::Browser || fetcher.driver().is_some())
        {
            warn!(
                target = %target.name,
                requested = target.concurrency,
                "Browser sessions drive one tab; running articles sequentially"
            );
            1
        } else {
            target.concurrency
        };

        Self {
            target,
            pipeline,
            pagination,
            fetcher,
            cancel,
            dedup: DedupIndex::new(),
            store: ArticleStore::new(),
            concurrency,
        }
    }

    /// Start from an existing index instead of an empty one.
    pub fn with_dedup(mut self, dedup: DedupIndex) -> Self {
        self.dedup = dedup;
        self
    }

    /// Crawl every keyword on every base URL.
    #[instrument(level = "info", skip_all, fields(target = %self.target.name))]
    pub async fn run(&mut self) -> TargetReport {
        let mut report = TargetReport {
            target: self.target.name.clone(),
            keywords: Vec::new(),
        };
        let target = self.target;

        'keywords: for keyword in &target.keywords {
            for base_url in &target.base_urls {
                if self.cancel.is_cancelled() {
                    info!("Crawl cancelled; skipping remaining keywords");
                    break 'keywords;
                }
                let outcome = self.run_keyword(keyword, base_url).await;
                info!(
                    %keyword,
                    %base_url,
                    matched = outcome.matched,
                    extracted = outcome.extracted,
                    duplicates = outcome.duplicates,
                    skipped = outcome.skipped.len(),
                    pages = outcome.pages,
                    termination = %outcome.termination,
                    "Keyword crawl finished"
                );
                report.keywords.push(outcome);
            }
        }

        info!(
            records = self.store.len(),
            extracted = report.extracted(),
            duplicates = report.duplicates(),
            skipped = report.skipped(),
            "Target crawl finished"
        );
        report
    }

    /// Hand back the accepted records and the dedup index.
    pub fn into_parts(self) -> (ArticleStore, DedupIndex) {
        (self.store, self.dedup)
    }

    #[instrument(level = "info", skip(self), fields(strategy = self.pagination.name()))]
    async fn run_keyword(&mut self, keyword: &str, base_url: &str) -> KeywordReport {
        let mut report = KeywordReport::new(keyword, base_url);
        let mut pager = self.pagination.fresh();
        let mut visited: HashSet<String> = HashSet::new();
        let mut phase = Phase::Idle;

        loop {
            phase = match phase {
                Phase::Idle => Phase::ListingFetch(pager.first_url(base_url, keyword)),

                Phase::ListingFetch(url) => {
                    if self.cancel.is_cancelled() {
                        Phase::Done(Termination::Cancelled)
                    } else {
                        match self
                            .fetcher
                            .fetch_until(&url, self.target.listing_marker())
                            .await
                        {
                            Ok(page) => Phase::Extracting(ListingPage {
                                url: page.url,
                                html: page.body.unwrap_or_default(),
                            }),
                            Err(e) => {
                                error!(%url, error = %e, "Listing fetch failed");
                                Phase::Done(Termination::ListingFailed(e.to_string()))
                            }
                        }
                    }
                }

                Phase::Extracting(page) => {
                    report.pages += 1;
                    let candidates = self.candidates(keyword, &page, &mut visited, &mut report);
                    Phase::ArticleFetch(page, candidates)
                }

                Phase::ArticleFetch(page, candidates) => {
                    let outcomes = self.fetch_articles(keyword, candidates).await;
                    Phase::Recording(page, outcomes)
                }

                Phase::Recording(page, outcomes) => {
                    for (url, outcome) in outcomes {
                        self.record(keyword, url, outcome, &mut report);
                    }
                    Phase::Paginating(page)
                }

                Phase::Paginating(page) => {
                    self.paginate(keyword, base_url, page, pager.as_mut(), &report)
                        .await
                }

                Phase::Done(termination) => {
                    report.termination = termination;
                    return report;
                }
            };
        }
    }

    /// Listing items worth fetching: unvisited, matching and not yet accepted.
    fn candidates(
        &self,
        keyword: &str,
        page: &ListingPage,
        visited: &mut HashSet<String>,
        report: &mut KeywordReport,
    ) -> Vec<ListingItem> {
        let items = self.pipeline.listing_items(&page.html, &page.url);
        let found = items.len();
        let mut candidates = Vec::new();

        for item in items {
            if !visited.insert(item.url.clone()) {
                continue;
            }
            if self.target.match_listing && !item.matches(keyword) {
                continue;
            }
            report.matched += 1;
            if self.dedup.seen(&self.target.dedup_scope.key(keyword, &item.url)) {
                debug!(url = %item.url, "Already accepted; skipping");
                report.duplicates += 1;
                continue;
            }
            candidates.push(item);
        }

        info!(
            page = report.pages,
            url = %page.url,
            count = found,
            candidates = candidates.len(),
            "Listing page parsed"
        );
        candidates
    }

    async fn fetch_articles(
        &self,
        keyword: &str,
        candidates: Vec<ListingItem>,
    ) -> Vec<(String, Result<ArticleRecord, SkipReason>)> {
        if self.concurrency <= 1 {
            let mut outcomes = Vec::with_capacity(candidates.len());
            for item in candidates {
                if self.cancel.is_cancelled() {
                    break;
                }
                let outcome = self.fetch_article(keyword, &item).await;
                outcomes.push((item.url, outcome));
            }
            return outcomes;
        }

        stream::iter(candidates)
            .map(|item| async move {
                if self.cancel.is_cancelled() {
                    return None;
                }
                let outcome = self.fetch_article(keyword, &item).await;
                Some((item.url, outcome))
            })
            .buffer_unordered(self.concurrency)
            .filter_map(std::future::ready)
            .collect()
            .await
    }

    #[instrument(level = "debug", skip(self, item), fields(url = %item.url))]
    async fn fetch_article(
        &self,
        keyword: &str,
        item: &ListingItem,
    ) -> Result<ArticleRecord, SkipReason> {
        let page = self
            .fetcher
            .fetch_detail(&item.url, self.target.article_marker())
            .await
            .map_err(|e| SkipReason::Fetch(e.to_string()))?;
        let html = page.body.ok_or(SkipReason::EmptyBody)?;

        let ctx = ArticleContext {
            keyword,
            url: &item.url,
        };
        self.pipeline
            .extract(&html, &ctx)
            .map_err(SkipReason::Extraction)
    }

    fn record(
        &mut self,
        keyword: &str,
        url: String,
        outcome: Result<ArticleRecord, SkipReason>,
        report: &mut KeywordReport,
    ) {
        match outcome {
            Ok(record) => {
                let key = self.target.dedup_scope.key(keyword, record.url());
                if self.dedup.mark(key) {
                    debug!(%url, words = record.word_count(), "Accepted article");
                    self.store.append(record);
                    report.extracted += 1;
                } else {
                    report.duplicates += 1;
                }
            }
            Err(reason) => {
                warn!(%url, %reason, "Skipping article");
                report.skipped.push(Skip { url, reason });
            }
        }
    }

    async fn paginate(
        &self,
        keyword: &str,
        base_url: &str,
        page: ListingPage,
        pager: &mut dyn PaginationStrategy,
        report: &KeywordReport,
    ) -> Phase {
        if self.cancel.is_cancelled() {
            return Phase::Done(Termination::Cancelled);
        }
        if report.pages >= self.target.max_pages {
            return Phase::Done(Termination::PageCeiling);
        }

        let driver = self.fetcher.driver();
        let view = PageView {
            url: &page.url,
            html: &page.html,
            keyword,
            template: base_url,
            driver,
        };
        let next = match pager.advance(&view).await {
            Ok(Some(next)) => next,
            Ok(None) => return Phase::Done(Termination::Exhausted),
            Err(e) => {
                warn!(error = %e, "Pagination failed");
                return Phase::Done(Termination::PaginationFailed(e.to_string()));
            }
        };

        if !self.page_delay().await {
            return Phase::Done(Termination::Cancelled);
        }

        match (next.cursor, driver) {
            (Some(url), _) => Phase::ListingFetch(url),
            (None, Some(driver)) => match live_page(driver).await {
                Ok(page) => Phase::Extracting(page),
                Err(e) => {
                    warn!(error = %e, "Could not read the live page after paginating");
                    Phase::Done(Termination::PaginationFailed(e.to_string()))
                }
            },
            (None, None) => Phase::Done(Termination::PaginationFailed(
                "strategy advanced in place without a browser page".to_string(),
            )),
        }
    }

    /// Sleep between listing pages. `false` when cancelled meanwhile.
    async fn page_delay(&self) -> bool {
        let delay = self.target.page_delay();
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }
}

async fn live_page(driver: &dyn PageDriver) -> Result<ListingPage, FetchError> {
    Ok(ListingPage {
        url: driver.current_url().await?,
        html: driver.html().await?,
    })
}

/// The crawl session held for one target run.
pub enum Session {
    Http(HttpFetcher),
    Browser(BrowserFetcher),
}

impl Session {
    pub async fn open(target: &CrawlTarget) -> Result<Self, SessionError> {
        match target.engine {
            Engine::Http => Ok(Session::Http(HttpFetcher::new(target)?)),
            Engine::Browser => Ok(Session::Browser(BrowserFetcher::launch(target).await?)),
        }
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        match self {
            Session::Http(fetcher) => fetcher,
            Session::Browser(fetcher) => fetcher,
        }
    }

    pub async fn close(self) {
        if let Session::Browser(mut browser) = self {
            browser.close().await;
        }
    }
}

/// Records and summary of one target run.
#[derive(Debug)]
pub struct TargetRun {
    pub report: TargetReport,
    pub store: ArticleStore,
}

/// Run one target from session open to session close.
///
/// # Errors
///
/// Returns a [`CrawlError`] when the target's selectors do not compile or
/// its session cannot be acquired. Nothing is fetched in either case.
#[instrument(level = "info", skip_all, fields(target = %target.name))]
pub async fn crawl_target(
    target: &CrawlTarget,
    cancel: &CancellationToken,
) -> Result<TargetRun, CrawlError> {
    let pipeline = ExtractorPipeline::from_target(target)?;
    let pagination = pagination::build(target)?;
    let session = Session::open(target).await?;

    let (report, store) = {
        let mut orchestrator =
            Orchestrator::new(target, pipeline, pagination, session.fetcher(), cancel.clone());
        let report = orchestrator.run().await;
        let (store, _) = orchestrator.into_parts();
        (report, store)
    };

    session.close().await;
    Ok(TargetRun { report, store })
}

/// Result of one target within a multi-target run.
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: String,
    pub result: Result<TargetRun, CrawlError>,
}

/// Crawl targets one after another. A failing target never stops its siblings.
pub async fn crawl_all(targets: &[CrawlTarget], cancel: &CancellationToken) -> Vec<TargetOutcome> {
    let mut outcomes = Vec::with_capacity(targets.len());
    for target in targets {
        if cancel.is_cancelled() {
            warn!(target = %target.name, "Cancelled before target started");
            break;
        }
        let result = crawl_target(target, cancel).await;
        if let Err(e) = &result {
            error!(target = %target.name, error = %e, "Target run failed");
        }
        outcomes.push(TargetOutcome {
            target: target.name.clone(),
            result,
        });
    }
    outcomes
}
