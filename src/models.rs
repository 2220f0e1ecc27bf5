//! Data models shared across the crawl engine.
//!
//! This module defines the core data structures that flow through a run:
//! - [`ArticleRecord`]: one accepted, fully extracted article
//! - [`ArticleDraft`]: the mutable builder an [`ArticleRecord`] is sealed from
//! - [`PublishedDate`]: a parsed publication date or the `"unknown"` sentinel
//! - [`ListingItem`]: one candidate entry found on a listing page
//! - [`FetchResult`]: a successful response, consumed immediately
//! - [`PaginationState`]: the cursor a pagination strategy hands back

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::fmt;

/// Sentinel rendered for optional fields that could not be extracted.
pub const UNKNOWN: &str = "unknown";

/// Publication date of an article.
///
/// Dates that cannot be parsed stay [`PublishedDate::Unknown`] unless the
/// target explicitly opts into substituting the current date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishedDate {
    Parsed(NaiveDate),
    Unknown,
}

impl PublishedDate {
    pub fn is_known(&self) -> bool {
        matches!(self, PublishedDate::Parsed(_))
    }
}

impl fmt::Display for PublishedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishedDate::Parsed(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            PublishedDate::Unknown => f.write_str(UNKNOWN),
        }
    }
}

impl Serialize for PublishedDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Field values gathered for an article before it is sealed.
///
/// The word count is not part of the draft: it is always derived from
/// `content` when [`ArticleDraft::seal`] builds the record.
#[derive(Debug, Clone)]
pub struct ArticleDraft {
    pub source: String,
    pub keyword: String,
    pub headline: String,
    pub byline: String,
    pub published: PublishedDate,
    pub section: String,
    pub content: String,
    pub url: String,
}

impl ArticleDraft {
    pub fn seal(self) -> ArticleRecord {
        let word_count = self.content.split_whitespace().count();
        ArticleRecord {
            source: self.source,
            keyword: self.keyword,
            headline: self.headline,
            byline: self.byline,
            published: self.published,
            section: self.section,
            content: self.content,
            url: self.url,
            word_count,
        }
    }
}

/// An accepted article. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleRecord {
    source: String,
    keyword: String,
    headline: String,
    byline: String,
    published: PublishedDate,
    section: String,
    content: String,
    url: String,
    word_count: usize,
}

impl ArticleRecord {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn headline(&self) -> &str {
        &self.headline
    }

    pub fn byline(&self) -> &str {
        &self.byline
    }

    pub fn published(&self) -> PublishedDate {
        self.published
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whitespace-token count of [`ArticleRecord::content`].
    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// Tags attached to the record. Currently the matching keyword only.
    pub fn tags(&self) -> Vec<String> {
        vec![self.keyword.clone()]
    }
}

/// One entry found on a listing (search/section) page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub title: String,
    /// Absolute URL of the article page.
    pub url: String,
    /// Raw date text as shown on the listing, possibly empty.
    pub date: String,
    pub summary: String,
}

impl ListingItem {
    /// Case-insensitive substring match of `keyword` against title, date and summary.
    pub fn matches(&self, keyword: &str) -> bool {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        let haystack = format!("{} {} {}", self.title, self.date, self.summary).to_lowercase();
        haystack.contains(&needle)
    }
}

/// A successful fetch. Bodies are `None` when the server sent nothing.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Final URL after redirects.
    pub url: String,
    /// Document status; `0` when a browser page loaded without a response.
    pub status: u16,
    pub body: Option<String>,
}

/// Where a pagination strategy says the next listing page lives.
///
/// `cursor` holds the next page's URL; `None` means the new results were
/// loaded into the live browser page in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationState {
    pub page_index: usize,
    pub cursor: Option<String>,
    pub has_more: bool,
}

impl PaginationState {
    pub fn first() -> Self {
        Self {
            page_index: 1,
            cursor: None,
            has_more: true,
        }
    }
}
