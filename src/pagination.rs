//! Listing traversal strategies.
//!
//! Sites expose "more results" in structurally different ways. Each way is a
//! [`PaginationStrategy`]; the orchestrator drives all of them through the
//! same loop and never knows which one it holds.
//!
//! | Kind | Engine | Next page comes from |
//! |------|--------|----------------------|
//! | `next_link` | any | the "Next" anchor in the pagination container |
//! | `numbered_page` | any | the link numbered `current + 1` |
//! | `load_more_button` | browser | clicking a button; items appended in place |
//! | `infinite_scroll` | browser | scrolling to the bottom; items appended in place |
//! | `fixed_page_range` | any | the base URL rendered with `{page}` |
//!
//! [`PaginationStrategy::advance`] returns `Ok(None)` once there is nothing
//! further to visit. A returned [`PaginationState`] with a `cursor` names the
//! next listing URL; without one, the live browser page already holds the
//! new results.

use crate::config::{CrawlTarget, PaginationKind};
use crate::error::{ConfigError, PaginationError};
use crate::extract::compile_selector;
use crate::fetch::PageDriver;
use crate::models::PaginationState;
use crate::utils::normalize_whitespace;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;
use url::Url;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

const DEFAULT_NEXT_LABEL: &str = "Next";
const DEFAULT_CURRENT: &str = "span.current";
const DEFAULT_PAGE_LINKS: &str = "a.page-numbers";
const DEFAULT_LOAD_WAIT: Duration = Duration::from_millis(5_000);
const DEFAULT_SCROLL_SETTLE: Duration = Duration::from_millis(2_000);
const GROWTH_POLL: Duration = Duration::from_millis(250);

/// The listing page a strategy is asked to move on from.
pub struct PageView<'a> {
    /// URL of the listing page currently loaded.
    pub url: &'a str,
    pub html: &'a str,
    pub keyword: &'a str,
    /// Base URL template the keyword loop started from.
    pub template: &'a str,
    /// Live page controls; `None` on the HTTP engine.
    pub driver: Option<&'a dyn PageDriver>,
}

#[async_trait]
pub trait PaginationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn state(&self) -> &PaginationState;

    /// A copy of this strategy positioned before its first page.
    fn fresh(&self) -> Box<dyn PaginationStrategy>;

    /// URL of the first listing page for `keyword`.
    fn first_url(&self, template: &str, keyword: &str) -> String {
        CrawlTarget::listing_url(template, keyword, 1)
    }

    /// Move to the next page of results, or report that there is none.
    async fn advance(
        &mut self,
        view: &PageView<'_>,
    ) -> Result<Option<PaginationState>, PaginationError>;
}

/// Compile the strategy configured for `target`.
///
/// # Errors
///
/// Returns a [`ConfigError`] when a pagination selector does not parse or a
/// required parameter is missing.
pub fn build(target: &CrawlTarget) -> Result<Box<dyn PaginationStrategy>, ConfigError> {
    let name = target.name.as_str();
    let params = &target.pagination.params;
    let container = || {
        params
            .container
            .as_deref()
            .ok_or_else(|| ConfigError::invalid(name, "pagination.params.container is required"))
            .and_then(|s| compile_selector(name, s))
    };
    let numbered = || -> Result<NumberedRules, ConfigError> {
        Ok(NumberedRules {
            container: container()?,
            current: compile_selector(name, params.current.as_deref().unwrap_or(DEFAULT_CURRENT))?,
            links: compile_selector(name, params.links.as_deref().unwrap_or(DEFAULT_PAGE_LINKS))?,
        })
    };

    let strategy: Box<dyn PaginationStrategy> = match target.pagination.kind {
        PaginationKind::NextLink => Box::new(NextLink {
            container: container()?,
            label: params
                .label
                .as_deref()
                .unwrap_or(DEFAULT_NEXT_LABEL)
                .trim()
                .to_lowercase(),
            fallback: if params.numbered_fallback {
                Some(numbered()?)
            } else {
                None
            },
            state: PaginationState::first(),
        }),
        PaginationKind::NumberedPage => Box::new(NumberedPage {
            rules: numbered()?,
            state: PaginationState::first(),
        }),
        PaginationKind::LoadMoreButton => {
            let button = params
                .button
                .clone()
                .ok_or_else(|| ConfigError::invalid(name, "pagination.params.button is required"))?;
            let items = params
                .items
                .clone()
                .ok_or_else(|| ConfigError::invalid(name, "pagination.params.items is required"))?;
            compile_selector(name, &button)?;
            compile_selector(name, &items)?;
            Box::new(LoadMoreButton {
                button,
                items,
                wait: params
                    .wait_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_LOAD_WAIT),
                state: PaginationState::first(),
            })
        }
        PaginationKind::InfiniteScroll => Box::new(InfiniteScroll {
            settle: params
                .settle_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SCROLL_SETTLE),
            state: PaginationState::first(),
        }),
        PaginationKind::FixedPageRange => Box::new(FixedPageRange {
            start: params.start.unwrap_or(1),
            max_pages: target.max_pages,
            state: PaginationState::first(),
        }),
    };
    Ok(strategy)
}

/// Validate the pagination section of `target` without keeping the result.
pub(crate) fn compile_selectors(target: &CrawlTarget) -> Result<(), ConfigError> {
    build(target).map(|_| ())
}

/// Record a step to `cursor` and hand back the new state.
fn step(state: &mut PaginationState, cursor: Option<String>) -> Option<PaginationState> {
    state.page_index += 1;
    state.cursor = cursor;
    state.has_more = true;
    Some(state.clone())
}

fn finish(state: &mut PaginationState) -> Option<PaginationState> {
    state.cursor = None;
    state.has_more = false;
    None
}

fn resolve(page_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let url = match Url::parse(page_url) {
        Ok(base) => base.join(href).ok()?,
        Err(_) => Url::parse(href).ok()?,
    };
    Some(url.to_string())
}

fn anchors<'a>(document: &'a Html, container: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    document
        .select(container)
        .flat_map(|c| c.select(&ANCHOR))
}

/// Follows the anchor labelled "Next" (or `rel="next"`).
#[derive(Debug, Clone)]
struct NextLink {
    container: Selector,
    /// Lower-cased label to match.
    label: String,
    fallback: Option<NumberedRules>,
    state: PaginationState,
}

impl NextLink {
    /// Arrows and other decoration around the label are ignored: `"Next »"` matches `"next"`.
    fn is_next(&self, anchor: ElementRef<'_>) -> bool {
        let element = anchor.value();
        if element
            .attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("next")))
        {
            return true;
        }
        let text = normalize_whitespace(&anchor.text().collect::<String>());
        let aria = element.attr("aria-label").unwrap_or_default();
        [text.as_str(), aria].iter().any(|candidate| {
            candidate
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
                == self.label
        })
    }

    fn find_next(&self, html: &str, page_url: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let linked = anchors(&document, &self.container)
            .filter(|a| self.is_next(*a))
            .find_map(|a| a.value().attr("href").and_then(|h| resolve(page_url, h)));
        linked.or_else(|| {
            self.fallback
                .as_ref()
                .and_then(|rules| rules.find_next(&document, page_url, self.state.page_index))
        })
    }
}

#[async_trait]
impl PaginationStrategy for NextLink {
    fn name(&self) -> &'static str {
        "next_link"
    }

    fn state(&self) -> &PaginationState {
        &self.state
    }

    fn fresh(&self) -> Box<dyn PaginationStrategy> {
        Box::new(Self {
            state: PaginationState::first(),
            ..self.clone()
        })
    }

    async fn advance(
        &mut self,
        view: &PageView<'_>,
    ) -> Result<Option<PaginationState>, PaginationError> {
        match self.find_next(view.html, view.url) {
            Some(next) => {
                debug!(%next, page = self.state.page_index + 1, "Found next page link");
                Ok(step(&mut self.state, Some(next)))
            }
            None => Ok(finish(&mut self.state)),
        }
    }
}

#[derive(Debug, Clone)]
struct NumberedRules {
    container: Selector,
    current: Selector,
    links: Selector,
}

impl NumberedRules {
    /// Link to page `current + 1`. The on-page indicator wins over `known_page`.
    fn find_next(&self, document: &Html, page_url: &str, known_page: usize) -> Option<String> {
        let current = document
            .select(&self.container)
            .flat_map(|c| c.select(&self.current))
            .find_map(|el| {
                normalize_whitespace(&el.text().collect::<String>())
                    .parse::<usize>()
                    .ok()
            })
            .unwrap_or(known_page);
        let wanted = (current + 1).to_string();

        document
            .select(&self.container)
            .flat_map(|c| c.select(&self.links))
            .filter(|a| normalize_whitespace(&a.text().collect::<String>()) == wanted)
            .find_map(|a| a.value().attr("href").and_then(|h| resolve(page_url, h)))
    }
}

/// Follows the numbered link after the current-page indicator.
#[derive(Debug, Clone)]
struct NumberedPage {
    rules: NumberedRules,
    state: PaginationState,
}

#[async_trait]
impl PaginationStrategy for NumberedPage {
    fn name(&self) -> &'static str {
        "numbered_page"
    }

    fn state(&self) -> &PaginationState {
        &self.state
    }

    fn fresh(&self) -> Box<dyn PaginationStrategy> {
        Box::new(Self {
            state: PaginationState::first(),
            ..self.clone()
        })
    }

    async fn advance(
        &mut self,
        view: &PageView<'_>,
    ) -> Result<Option<PaginationState>, PaginationError> {
        let next = {
            let document = Html::parse_document(view.html);
            self.rules
                .find_next(&document, view.url, self.state.page_index)
        };
        match next {
            Some(next) => Ok(step(&mut self.state, Some(next))),
            None => Ok(finish(&mut self.state)),
        }
    }
}

/// Clicks a "load more" button until the item count stops growing.
#[derive(Debug, Clone)]
struct LoadMoreButton {
    button: String,
    items: String,
    wait: Duration,
    state: PaginationState,
}

#[async_trait]
impl PaginationStrategy for LoadMoreButton {
    fn name(&self) -> &'static str {
        "load_more_button"
    }

    fn state(&self) -> &PaginationState {
        &self.state
    }

    fn fresh(&self) -> Box<dyn PaginationStrategy> {
        Box::new(Self {
            state: PaginationState::first(),
            ..self.clone()
        })
    }

    async fn advance(
        &mut self,
        view: &PageView<'_>,
    ) -> Result<Option<PaginationState>, PaginationError> {
        let driver = view.driver.ok_or(PaginationError::RequiresBrowser {
            strategy: self.name(),
        })?;

        let before = driver.count(&self.items).await?;
        if !driver.is_actionable(&self.button).await? {
            debug!(button = %self.button, "Load-more button not actionable");
            return Ok(finish(&mut self.state));
        }
        if !driver.click(&self.button).await? {
            return Ok(finish(&mut self.state));
        }

        let started = Instant::now();
        loop {
            let now = driver.count(&self.items).await?;
            if now > before {
                debug!(before, now, "Load-more appended items");
                return Ok(step(&mut self.state, None));
            }
            if started.elapsed() >= self.wait {
                debug!(count = now, waited = ?self.wait, "Item count did not grow after click");
                return Ok(finish(&mut self.state));
            }
            sleep(GROWTH_POLL).await;
        }
    }
}

/// Scrolls to the bottom until the document stops growing.
#[derive(Debug, Clone)]
struct InfiniteScroll {
    settle: Duration,
    state: PaginationState,
}

#[async_trait]
impl PaginationStrategy for InfiniteScroll {
    fn name(&self) -> &'static str {
        "infinite_scroll"
    }

    fn state(&self) -> &PaginationState {
        &self.state
    }

    fn fresh(&self) -> Box<dyn PaginationStrategy> {
        Box::new(Self {
            state: PaginationState::first(),
            ..self.clone()
        })
    }

    async fn advance(
        &mut self,
        view: &PageView<'_>,
    ) -> Result<Option<PaginationState>, PaginationError> {
        let driver = view.driver.ok_or(PaginationError::RequiresBrowser {
            strategy: self.name(),
        })?;

        let before = driver.document_height().await?;
        driver.scroll_to_bottom().await?;
        sleep(self.settle).await;
        let after = driver.document_height().await?;

        if after > before {
            debug!(before, after, "Scroll loaded more content");
            Ok(step(&mut self.state, None))
        } else {
            Ok(finish(&mut self.state))
        }
    }
}

/// Visits `start..start + max_pages` regardless of page content.
#[derive(Debug, Clone)]
struct FixedPageRange {
    start: usize,
    max_pages: usize,
    state: PaginationState,
}

#[async_trait]
impl PaginationStrategy for FixedPageRange {
    fn name(&self) -> &'static str {
        "fixed_page_range"
    }

    fn state(&self) -> &PaginationState {
        &self.state
    }

    fn fresh(&self) -> Box<dyn PaginationStrategy> {
        Box::new(Self {
            state: PaginationState::first(),
            ..self.clone()
        })
    }

    fn first_url(&self, template: &str, keyword: &str) -> String {
        CrawlTarget::listing_url(template, keyword, self.start)
    }

    async fn advance(
        &mut self,
        view: &PageView<'_>,
    ) -> Result<Option<PaginationState>, PaginationError> {
        if self.state.page_index >= self.max_pages {
            return Ok(finish(&mut self.state));
        }
        let page = self.start + self.state.page_index;
        let next = CrawlTarget::listing_url(view.template, view.keyword, page);
        Ok(step(&mut self.state, Some(next)))
    }
}
