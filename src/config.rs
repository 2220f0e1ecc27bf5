//! Crawl target configuration.
//!
//! Targets are declared in a YAML file and loaded once per invocation. A
//! target is pure data: the selectors, pagination mechanism and politeness
//! settings for one site, plus the keywords to look for there.
//!
//! ```yaml
//! targets:
//!   - name: BusinessMirror
//!     base_urls: ["https://businessmirror.com.ph/business/"]
//!     keywords_file: keywords.json
//!     engine: browser
//!     pagination:
//!       kind: next_link
//!       params:
//!         container: "nav.navigation.pagination .nav-links"
//!         numbered_fallback: true
//!     selectors:
//!       listing:
//!         item: article
//!         title: "h2.entry-title a"
//!         date: "li.meta-date a"
//!         summary: "div.entry-summary p"
//!       article:
//!         headline: "h1.entry-title"
//!         content: "div.entry-content"
//! ```

use crate::error::ConfigError;
use itertools::Itertools;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Top-level YAML document.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    pub targets: Vec<CrawlTarget>,
}

/// How two matches of the same article are told apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum DedupScope {
    /// An article is accepted once per run, whichever keyword found it.
    #[default]
    #[serde(rename = "url")]
    Url,
    /// An article is accepted once per keyword that matched it.
    #[serde(rename = "keyword+url")]
    KeywordUrl,
}

/// What to record when a publication date cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFallback {
    #[default]
    Unknown,
    /// Substitute today's date. Fabricates data; every use is logged.
    Now,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Http,
    Browser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationKind {
    NextLink,
    NumberedPage,
    LoadMoreButton,
    InfiniteScroll,
    FixedPageRange,
}

impl PaginationKind {
    pub fn needs_browser(self) -> bool {
        matches!(
            self,
            PaginationKind::LoadMoreButton | PaginationKind::InfiniteScroll
        )
    }
}

/// Strategy parameters. Which ones are required depends on the kind.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaginationParams {
    /// Element holding the pagination controls.
    pub container: Option<String>,
    /// Accessible text of the "next" control. Defaults to `Next`.
    pub label: Option<String>,
    /// Fall back to numbered links when no "next" control exists.
    pub numbered_fallback: bool,
    /// Current-page indicator. Defaults to `span.current`.
    pub current: Option<String>,
    /// Numbered page links. Defaults to `a.page-numbers`.
    pub links: Option<String>,
    /// "Load more" button.
    pub button: Option<String>,
    /// Items whose count must grow after clicking "load more".
    pub items: Option<String>,
    pub wait_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    /// First page number for fixed page ranges. Defaults to 1.
    pub start: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub kind: PaginationKind,
    #[serde(default)]
    pub params: PaginationParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListingSelectors {
    /// One element per listing entry.
    pub item: String,
    pub title: String,
    /// Anchor carrying the article link. Defaults to the title element.
    pub link: Option<String>,
    pub date: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArticleSelectors {
    pub headline: String,
    pub byline: Option<String>,
    pub date: Option<String>,
    pub section: Option<String>,
    /// Container whose paragraphs form the article body.
    pub content: String,
    #[serde(default = "default_paragraph")]
    pub paragraph: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    pub listing: ListingSelectors,
    pub article: ArticleSelectors,
}

/// Retry and timeout policy for every request a target makes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
    pub retryable_statuses: Vec<u16>,
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_ms: 250,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Marker awaited after loading a listing page. Defaults to the listing item selector.
    pub listing_marker: Option<String>,
    /// Marker awaited after loading an article page. Defaults to the content selector.
    pub article_marker: Option<String>,
    pub wait_timeout_seconds: u64,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            listing_marker: None,
            article_marker: None,
            wait_timeout_seconds: 15,
            chrome_executable: None,
        }
    }
}

/// One site and the keywords to crawl it for. Read-only during a run.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlTarget {
    /// Source name recorded on every article.
    pub name: String,
    /// Listing URLs. May contain `{keyword}` and `{page}` placeholders.
    pub base_urls: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// JSON file holding a list of keyword strings, relative to the config file.
    #[serde(default)]
    pub keywords_file: Option<PathBuf>,
    pub pagination: PaginationConfig,
    pub selectors: SelectorConfig,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_seconds: f64,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub dedup_scope: DedupScope,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub date_fallback: DateFallback,
    #[serde(default)]
    pub default_section: Option<String>,
    #[serde(default = "default_page_delay")]
    pub page_delay_seconds: f64,
    /// Article pages fetched in parallel per listing page (HTTP engine only).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Require listing items to mention the keyword. Disable for search result pages.
    #[serde(default = "default_true")]
    pub match_listing: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub browser: BrowserSettings,
}

fn default_paragraph() -> String {
    "p".to_string()
}

fn default_rate_limit() -> f64 {
    1.0
}

fn default_max_pages() -> usize {
    10
}

fn default_page_delay() -> f64 {
    2.0
}

fn default_concurrency() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl CrawlConfig {
    /// Read, resolve and validate a YAML config file.
    ///
    /// Keyword files are resolved relative to the config file's directory and
    /// merged with inline keywords; duplicates are dropped, order kept.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed, a
    /// keyword file is malformed, or any target fails validation.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: CrawlConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        for target in &mut config.targets {
            target.resolve_keywords(base_dir)?;
            target.validate()?;
        }
        info!(targets = config.targets.len(), "Loaded crawl configuration");
        Ok(config)
    }
}

impl CrawlTarget {
    fn resolve_keywords(&mut self, base_dir: &Path) -> Result<(), ConfigError> {
        if let Some(file) = &self.keywords_file {
            let path = base_dir.join(file);
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let loaded: Vec<String> =
                serde_json::from_str(&raw).map_err(|source| ConfigError::Keywords {
                    path: path.clone(),
                    source,
                })?;
            debug!(target = %self.name, count = loaded.len(), path = %path.display(), "Loaded keywords file");
            self.keywords.extend(loaded);
        }
        self.keywords = self
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .unique()
            .collect();
        Ok(())
    }

    /// Check the target for settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name.as_str();
        if name.trim().is_empty() {
            return Err(ConfigError::invalid("<unnamed>", "name must not be empty"));
        }
        if self.base_urls.is_empty() {
            return Err(ConfigError::invalid(name, "base_urls must not be empty"));
        }
        if self.keywords.is_empty() {
            return Err(ConfigError::invalid(name, "no keywords configured"));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::invalid(name, "max_pages must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid(name, "concurrency must be at least 1"));
        }
        for (field, value) in [
            ("rate_limit_seconds", self.rate_limit_seconds),
            ("page_delay_seconds", self.page_delay_seconds),
        ] {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::invalid(
                    name,
                    format!("{field} must be a non-negative number of seconds, got {value}"),
                ));
            }
        }

        let params = &self.pagination.params;
        match self.pagination.kind {
            PaginationKind::NextLink | PaginationKind::NumberedPage => {
                if params.container.is_none() {
                    return Err(ConfigError::invalid(
                        name,
                        "pagination.params.container is required",
                    ));
                }
            }
            PaginationKind::LoadMoreButton => {
                if params.button.is_none() || params.items.is_none() {
                    return Err(ConfigError::invalid(
                        name,
                        "load_more_button needs pagination.params.button and .items",
                    ));
                }
            }
            PaginationKind::FixedPageRange => {
                if !self.base_urls.iter().any(|u| u.contains("{page}")) {
                    return Err(ConfigError::invalid(
                        name,
                        "fixed_page_range needs a `{page}` placeholder in base_urls",
                    ));
                }
            }
            PaginationKind::InfiniteScroll => {}
        }
        if self.pagination.kind.needs_browser() && self.engine != Engine::Browser {
            return Err(ConfigError::invalid(
                name,
                format!(
                    "{:?} pagination requires `engine: browser`",
                    self.pagination.kind
                ),
            ));
        }

        // Compiling the pipeline surfaces bad selectors before any request.
        crate::extract::ExtractorPipeline::from_target(self)?;
        crate::pagination::compile_selectors(self)?;
        Ok(())
    }

    /// Gap between requests. Unvalidated, unrepresentable values read as zero.
    pub fn rate_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.rate_limit_seconds).unwrap_or(Duration::ZERO)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.page_delay_seconds).unwrap_or(Duration::ZERO)
    }

    /// Render a base URL template for one keyword and page number.
    pub fn listing_url(template: &str, keyword: &str, page: usize) -> String {
        template
            .replace("{keyword}", &urlencoding::encode(keyword))
            .replace("{page}", &page.to_string())
    }

    pub fn listing_marker(&self) -> &str {
        self.browser
            .listing_marker
            .as_deref()
            .unwrap_or(&self.selectors.listing.item)
    }

    pub fn article_marker(&self) -> &str {
        self.browser
            .article_marker
            .as_deref()
            .unwrap_or(&self.selectors.article.content)
    }
}
