//! Ordered accumulation of accepted articles.

use crate::models::ArticleRecord;

/// Append-only list of records in acceptance order.
///
/// Holds no dedup logic; callers check the [`DedupIndex`](crate::dedup::DedupIndex) first.
#[derive(Debug, Clone, Default)]
pub struct ArticleStore {
    records: Vec<ArticleRecord>,
}

impl ArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: ArticleRecord) {
        self.records.push(record);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ArticleRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_vec(self) -> Vec<ArticleRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a ArticleStore {
    type Item = &'a ArticleRecord;
    type IntoIter = std::slice::Iter<'a, ArticleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl Extend<ArticleRecord> for ArticleStore {
    fn extend<I: IntoIterator<Item = ArticleRecord>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleDraft, PublishedDate};

    fn record(headline: &str) -> ArticleRecord {
        ArticleDraft {
            source: "Test Times".to_string(),
            keyword: "BSP".to_string(),
            headline: headline.to_string(),
            byline: "unknown".to_string(),
            published: PublishedDate::Unknown,
            section: String::new(),
            content: "body".to_string(),
            url: format!("https://news.test/{headline}"),
        }
        .seal()
    }

    #[test]
    fn test_append_keeps_order() {
        let mut store = ArticleStore::new();
        assert!(store.is_empty());
        store.append(record("b"));
        store.append(record("a"));
        store.extend([record("c")]);

        let headlines: Vec<_> = store.iter().map(|r| r.headline()).collect();
        assert_eq!(headlines, vec!["b", "a", "c"]);
        assert_eq!(store.len(), 3);
        assert_eq!((&store).into_iter().count(), 3);
        assert_eq!(store.into_vec().len(), 3);
    }
}
