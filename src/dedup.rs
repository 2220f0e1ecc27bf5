//! Session-scoped record of accepted articles.

use crate::config::DedupScope;
use std::collections::HashSet;

/// Identity of an accepted article under a target's [`DedupScope`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Url(String),
    KeywordUrl { keyword: String, url: String },
}

impl DedupScope {
    pub fn key(self, keyword: &str, url: &str) -> DedupKey {
        match self {
            DedupScope::Url => DedupKey::Url(url.to_string()),
            DedupScope::KeywordUrl => DedupKey::KeywordUrl {
                keyword: keyword.to_string(),
                url: url.to_string(),
            },
        }
    }
}

/// Keys accepted so far in one run. Never persisted, never shared across targets.
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    keys: HashSet<DedupKey>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    /// Record `key`; returns `false` if it was already present.
    pub fn mark(&mut self, key: DedupKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<DedupKey> for DedupIndex {
    fn from_iter<I: IntoIterator<Item = DedupKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_scope_ignores_keyword() {
        let scope = DedupScope::Url;
        assert_eq!(
            scope.key("BSP", "https://x.test/a"),
            scope.key("GCash", "https://x.test/a")
        );
    }

    #[test]
    fn test_keyword_url_scope_separates_keywords() {
        let scope = DedupScope::KeywordUrl;
        assert_ne!(
            scope.key("BSP", "https://x.test/a"),
            scope.key("GCash", "https://x.test/a")
        );
    }

    #[test]
    fn test_mark_and_seen() {
        let mut index = DedupIndex::new();
        let key = DedupScope::Url.key("BSP", "https://x.test/a");
        assert!(!index.seen(&key));
        assert!(index.mark(key.clone()));
        assert!(index.seen(&key));
        assert!(!index.mark(key));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_seeded_index() {
        let index: DedupIndex = ["u1", "u2"]
            .into_iter()
            .map(|u| DedupKey::Url(u.to_string()))
            .collect();
        assert_eq!(index.len(), 2);
        assert!(index.seen(&DedupKey::Url("u1".to_string())));
    }
}
