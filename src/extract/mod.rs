//! Selector-driven extraction of listing entries and article records.
//!
//! An [`ExtractorPipeline`] is compiled once per target from its
//! [`SelectorConfig`](crate::config::SelectorConfig) and then applied to raw
//! HTML. It never fetches anything itself.
//!
//! # Field resolution
//!
//! | Field | Required | When missing |
//! |-------|----------|--------------|
//! | headline | yes | candidate discarded ([`ExtractionError::MissingField`]) |
//! | content | yes | candidate discarded ([`ExtractionError::MissingField`]) |
//! | byline | no | `"unknown"` |
//! | published date | no | `"unknown"`, or today's date under `date_fallback: now` |
//! | section | no | the target's `default_section`, else empty |
//!
//! # Content assembly
//!
//! Paragraph nodes under the content container are whitespace-normalised;
//! empty paragraphs and share/follow boilerplate are dropped and the rest
//! joined with a blank line. A container without paragraph nodes
//! contributes its own text as a single paragraph.
//!
//! # Thread safety
//!
//! Compiled selectors are `Send + Sync`. Parsed documents are not, so every
//! method parses and drops its document without crossing an `.await`.

pub mod text;

use crate::config::{CrawlTarget, DateFallback};
use crate::error::{ConfigError, ExtractionError};
use crate::models::{ArticleDraft, ArticleRecord, ListingItem, PublishedDate, UNKNOWN};
use crate::utils::truncate_for_log;
use chrono::Utc;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use text::{PARAGRAPH_SEPARATOR, is_boilerplate, parse_date, text_of};
use tracing::{debug, instrument, warn};
use url::Url;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

/// Where an article page came from, as far as the record is concerned.
#[derive(Debug, Clone, Copy)]
pub struct ArticleContext<'a> {
    /// Keyword whose listing match led to this page.
    pub keyword: &'a str,
    /// Resolved listing link that led here, before any redirect. Recorded as
    /// the article's URL and dedup key.
    pub url: &'a str,
}

#[derive(Debug, Clone)]
struct ListingRules {
    item: Selector,
    title: Selector,
    link: Option<Selector>,
    date: Option<Selector>,
    summary: Option<Selector>,
}

#[derive(Debug, Clone)]
struct ArticleRules {
    headline: Selector,
    byline: Option<Selector>,
    date: Option<Selector>,
    section: Option<Selector>,
    content: Selector,
    paragraph: Selector,
}

/// Compiled selectors and field policies for one target.
#[derive(Debug, Clone)]
pub struct ExtractorPipeline {
    source: String,
    listing: ListingRules,
    article: ArticleRules,
    date_format: Option<String>,
    date_fallback: DateFallback,
    default_section: String,
}

/// Compile one CSS selector, naming the target in the error.
pub(crate) fn compile_selector(target: &str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::Selector {
        target: target.to_string(),
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

impl ExtractorPipeline {
    /// Compile every listing and article selector of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Selector`] for the first selector that does not parse.
    pub fn from_target(target: &CrawlTarget) -> Result<Self, ConfigError> {
        let name = target.name.as_str();
        let compile = |s: &str| compile_selector(name, s);
        let compile_opt = |s: &Option<String>| s.as_deref().map(compile).transpose();

        let listing = &target.selectors.listing;
        let article = &target.selectors.article;
        Ok(Self {
            source: target.name.clone(),
            listing: ListingRules {
                item: compile(&listing.item)?,
                title: compile(&listing.title)?,
                link: compile_opt(&listing.link)?,
                date: compile_opt(&listing.date)?,
                summary: compile_opt(&listing.summary)?,
            },
            article: ArticleRules {
                headline: compile(&article.headline)?,
                byline: compile_opt(&article.byline)?,
                date: compile_opt(&article.date)?,
                section: compile_opt(&article.section)?,
                content: compile(&article.content)?,
                paragraph: compile(&article.paragraph)?,
            },
            date_format: target.date_format.clone(),
            date_fallback: target.date_fallback,
            default_section: target.default_section.clone().unwrap_or_default(),
        })
    }

    /// Candidate entries on a listing page, in document order.
    ///
    /// Links are resolved against `page_url`; only `http(s)` links survive,
    /// fragments are stripped and repeated URLs keep their first entry.
    /// Entries without a title or link are skipped.
    #[instrument(level = "debug", skip(self, html), fields(source = %self.source))]
    pub fn listing_items(&self, html: &str, page_url: &str) -> Vec<ListingItem> {
        let base = Url::parse(page_url).ok();
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for entry in document.select(&self.listing.item) {
            let Some(title_el) = entry.select(&self.listing.title).next() else {
                debug!("Listing entry without title element; skipping");
                continue;
            };
            let title = text_of(title_el);
            if title.is_empty() {
                debug!("Listing entry with empty title; skipping");
                continue;
            }
            let Some(url) = self
                .link_href(entry, title_el)
                .and_then(|href| resolve_link(base.as_ref(), href))
            else {
                debug!(%title, "Listing entry without usable link; skipping");
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }

            items.push(ListingItem {
                title,
                url,
                date: first_text(entry, self.listing.date.as_ref()).unwrap_or_default(),
                summary: first_text(entry, self.listing.summary.as_ref()).unwrap_or_default(),
            });
        }

        debug!(count = items.len(), "Parsed listing page");
        items
    }

    fn link_href<'a>(&self, entry: ElementRef<'a>, title: ElementRef<'a>) -> Option<&'a str> {
        if let Some(link) = &self.listing.link {
            return entry.select(link).find_map(|a| a.value().attr("href"));
        }
        title
            .value()
            .attr("href")
            .or_else(|| title.select(&ANCHOR).find_map(|a| a.value().attr("href")))
            .or_else(|| entry.select(&ANCHOR).find_map(|a| a.value().attr("href")))
    }

    /// Build an article record from a fetched article page.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::MissingField`] when the headline is absent
    /// or the content container is absent or yields no text.
    #[instrument(level = "debug", skip(self, html), fields(source = %self.source, url = %ctx.url))]
    pub fn extract(
        &self,
        html: &str,
        ctx: &ArticleContext<'_>,
    ) -> Result<ArticleRecord, ExtractionError> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let headline = first_text(root, Some(&self.article.headline))
            .ok_or(ExtractionError::MissingField("headline"))?;
        let container = document
            .select(&self.article.content)
            .next()
            .ok_or(ExtractionError::MissingField("content"))?;
        let content = self.assemble_content(container);
        if content.is_empty() {
            return Err(ExtractionError::MissingField("content"));
        }

        let byline =
            first_text(root, self.article.byline.as_ref()).unwrap_or_else(|| UNKNOWN.to_string());
        let section = first_text(root, self.article.section.as_ref())
            .unwrap_or_else(|| self.default_section.clone());
        let published = self.published_date(root, ctx.url);

        Ok(ArticleDraft {
            source: self.source.clone(),
            keyword: ctx.keyword.to_string(),
            headline,
            byline,
            published,
            section,
            content,
            url: ctx.url.to_string(),
        }
        .seal())
    }

    fn assemble_content(&self, container: ElementRef<'_>) -> String {
        let mut paragraphs: Vec<String> = container
            .select(&self.article.paragraph)
            .map(text_of)
            .collect();
        if paragraphs.is_empty() {
            paragraphs.push(text_of(container));
        }

        paragraphs
            .into_iter()
            .filter(|p| !p.is_empty())
            .filter(|p| {
                let boilerplate = is_boilerplate(p);
                if boilerplate {
                    debug!(paragraph = %truncate_for_log(p, 80), "Dropping boilerplate paragraph");
                }
                !boilerplate
            })
            .collect::<Vec<_>>()
            .join(PARAGRAPH_SEPARATOR)
    }

    fn published_date(&self, root: ElementRef<'_>, url: &str) -> PublishedDate {
        let raw = self
            .article
            .date
            .as_ref()
            .and_then(|sel| root.select(sel).next())
            .map(|el| match el.value().attr("datetime") {
                Some(attr) if !attr.trim().is_empty() => attr.to_string(),
                _ => text_of(el),
            });

        if let Some(date) = raw
            .as_deref()
            .and_then(|r| parse_date(r, self.date_format.as_deref()))
        {
            return PublishedDate::Parsed(date);
        }

        match self.date_fallback {
            DateFallback::Unknown => PublishedDate::Unknown,
            DateFallback::Now => {
                warn!(
                    %url,
                    raw = raw.as_deref().unwrap_or(""),
                    "Publication date unparseable; recording today's date instead"
                );
                PublishedDate::Parsed(Utc::now().date_naive())
            }
        }
    }
}

/// Text of the first match of `selector` under `scope` that is not empty.
fn first_text(scope: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    scope
        .select(selector?)
        .map(text_of)
        .find(|t| !t.is_empty())
}

fn resolve_link(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{article_html, listing_html, news_target};
    use chrono::NaiveDate;

    const PAGE: &str = "https://news.test/search?s=BSP";

    fn pipeline() -> ExtractorPipeline {
        ExtractorPipeline::from_target(&news_target()).unwrap()
    }

    fn ctx() -> ArticleContext<'static> {
        ArticleContext {
            keyword: "BSP",
            url: "https://news.test/business/bsp-rates",
        }
    }

    #[test]
    fn test_listing_items_resolve_links_against_page() {
        let html = listing_html(
            &[
                ("BSP keeps rates", "/business/bsp-rates#comments", "Policy"),
                ("GCash expands", "https://other.test/gcash", "Fintech"),
            ],
            None,
        );
        let items = pipeline().listing_items(&html, PAGE);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "BSP keeps rates");
        assert_eq!(items[0].url, "https://news.test/business/bsp-rates");
        assert_eq!(items[0].date, "October 3, 2024");
        assert_eq!(items[0].summary, "Policy");
        assert_eq!(items[1].url, "https://other.test/gcash");
    }

    #[test]
    fn test_listing_items_skip_unusable_and_repeated_links() {
        let html = listing_html(
            &[
                ("Mail us", "mailto:desk@news.test", ""),
                ("Anchor only", "#top", ""),
                ("BSP one", "/a1", ""),
                ("BSP one again", "/a1", ""),
            ],
            None,
        );
        let items = pipeline().listing_items(&html, PAGE);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "BSP one");
    }

    #[test]
    fn test_listing_link_falls_back_to_anchor_inside_title() {
        let mut target = news_target();
        target.selectors.listing.title = "h2.entry-title".to_string();
        let pipeline = ExtractorPipeline::from_target(&target).unwrap();

        let html = listing_html(&[("BSP story", "/bsp", "")], None);
        let items = pipeline.listing_items(&html, PAGE);
        assert_eq!(items[0].url, "https://news.test/bsp");
    }

    #[test]
    fn test_listing_link_selector_takes_precedence() {
        let mut target = news_target();
        target.selectors.listing.link = Some("a.permalink".to_string());
        let pipeline = ExtractorPipeline::from_target(&target).unwrap();

        let html = r#"<article class="post"><h2 class="entry-title"><a href="/teaser">BSP</a></h2><a class="permalink" href="/full">read</a></article>"#;
        let items = pipeline.listing_items(html, PAGE);
        assert_eq!(items[0].url, "https://news.test/full");
    }

    #[test]
    fn test_extract_full_record() {
        let html = article_html(
            "BSP keeps rates steady",
            &["The Monetary Board held.", "  Inflation   eased. ", ""],
        );
        let record = pipeline().extract(&html, &ctx()).unwrap();

        assert_eq!(record.source(), "Test Times");
        assert_eq!(record.keyword(), "BSP");
        assert_eq!(record.headline(), "BSP keeps rates steady");
        assert_eq!(record.byline(), "Maria Santos");
        assert_eq!(record.section(), "Business");
        assert_eq!(
            record.published(),
            PublishedDate::Parsed(NaiveDate::from_ymd_opt(2024, 10, 3).unwrap())
        );
        assert_eq!(record.content(), "The Monetary Board held.\n\nInflation eased.");
        assert_eq!(record.word_count(), 6);
        assert_eq!(record.url(), "https://news.test/business/bsp-rates");
    }

    #[test]
    fn test_share_prompt_is_excluded_from_content() {
        let html = article_html(
            "GCash expands",
            &["GCash opened new branches.", "Share this:", "Follow us on X", "Tweet"],
        );
        let record = pipeline().extract(&html, &ctx()).unwrap();
        assert_eq!(record.content(), "GCash opened new branches.");
        assert!(!record.content().contains("Share this"));
    }

    #[test]
    fn test_missing_headline_discards_candidate() {
        let html = r#"<div class="entry-content"><p>Body</p></div>"#;
        assert_eq!(
            pipeline().extract(html, &ctx()),
            Err(ExtractionError::MissingField("headline"))
        );
    }

    #[test]
    fn test_missing_or_empty_content_discards_candidate() {
        let html = r#"<h1 class="entry-title">Title</h1>"#;
        assert_eq!(
            pipeline().extract(html, &ctx()),
            Err(ExtractionError::MissingField("content"))
        );

        let html = article_html("Title", &["Share this:"]);
        assert_eq!(
            pipeline().extract(&html, &ctx()),
            Err(ExtractionError::MissingField("content"))
        );
    }

    #[test]
    fn test_container_without_paragraphs_uses_its_text() {
        let html = r#"<h1 class="entry-title">T</h1><div class="entry-content">Plain   body text</div>"#;
        let record = pipeline().extract(html, &ctx()).unwrap();
        assert_eq!(record.content(), "Plain body text");
    }

    #[test]
    fn test_optional_fields_fall_back_to_sentinels() {
        let mut target = news_target();
        target.default_section = Some("Banking".to_string());
        let pipeline = ExtractorPipeline::from_target(&target).unwrap();

        let html = r#"<h1 class="entry-title">T</h1><div class="entry-content"><p>Body</p></div>"#;
        let record = pipeline.extract(html, &ctx()).unwrap();
        assert_eq!(record.byline(), UNKNOWN);
        assert_eq!(record.section(), "Banking");
        assert_eq!(record.published(), PublishedDate::Unknown);
    }

    #[test]
    fn test_datetime_attribute_is_preferred() {
        let html = r#"<h1 class="entry-title">T</h1><time class="published" datetime="2024-10-05T09:00:00+08:00">Saturday</time><div class="entry-content"><p>Body</p></div>"#;
        let record = pipeline().extract(html, &ctx()).unwrap();
        assert_eq!(
            record.published(),
            PublishedDate::Parsed(NaiveDate::from_ymd_opt(2024, 10, 5).unwrap())
        );
    }

    #[test]
    fn test_unparseable_date_follows_fallback_policy() {
        let html = r#"<h1 class="entry-title">T</h1><time class="published">3 hours ago</time><div class="entry-content"><p>Body</p></div>"#;
        assert_eq!(
            pipeline().extract(html, &ctx()).unwrap().published(),
            PublishedDate::Unknown
        );

        let mut target = news_target();
        target.date_fallback = DateFallback::Now;
        let pipeline = ExtractorPipeline::from_target(&target).unwrap();
        assert!(pipeline.extract(html, &ctx()).unwrap().published().is_known());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let html = article_html("BSP", &["One.", "Two.", "Share this:"]);
        let p = pipeline();
        assert_eq!(p.extract(&html, &ctx()), p.extract(&html, &ctx()));
    }

    #[test]
    fn test_invalid_selector_names_target() {
        let mut target = news_target();
        target.selectors.article.byline = Some("span[".to_string());
        match ExtractorPipeline::from_target(&target) {
            Err(ConfigError::Selector { target, selector, .. }) => {
                assert_eq!(target, "Test Times");
                assert_eq!(selector, "span[");
            }
            other => panic!("expected selector error, got {other:?}"),
        }
    }
}
