//! Text-level helpers: node text, boilerplate filtering and date parsing.

use crate::utils::normalize_whitespace;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use scraper::ElementRef;

/// Separator placed between surviving paragraphs of an article body.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Share/follow prompts that are never part of an article.
pub const BOILERPLATE: [&str; 5] = ["share this:", "like this:", "follow us", "tweet", "pin it"];

/// Whitespace-normalised text of an element and its descendants.
pub fn text_of(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

/// Whether a paragraph is a share/follow prompt rather than article text.
///
/// Matches when the lower-cased text equals a pattern, or starts with one
/// followed by a non-alphanumeric character: `"Follow us on X"` is
/// boilerplate, `"Tweets from the governor"` is not.
pub fn is_boilerplate(paragraph: &str) -> bool {
    let normalized = normalize_whitespace(paragraph).to_lowercase();
    BOILERPLATE.iter().any(|pattern| {
        normalized
            .strip_prefix(pattern)
            .is_some_and(|rest| rest.chars().next().is_none_or(|c| !c.is_alphanumeric()))
    })
}

/// Parse a publication date.
///
/// `format` (a chrono format string) is tried first, as a datetime and
/// then as a date. RFC 3339 and `YYYY-MM-DD` are always accepted.
pub fn parse_date(raw: &str, format: Option<&str>) -> Option<NaiveDate> {
    let raw = normalize_whitespace(raw);
    if raw.is_empty() {
        return None;
    }
    if let Some(format) = format {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(&raw, format) {
            return Some(datetime.date());
        }
        if let Ok(date) = NaiveDate::parse_from_str(&raw, format) {
            return Some(date);
        }
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(&raw) {
        return Some(datetime.date_naive());
    }
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok()
}
