use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Underscores in dump titles stand for spaces.
pub fn normalize(name: &str) -> String {
    name.replace('_', " ")
}

/// A `<namespace>` entry from the export's `<siteinfo>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub attributes: Vec<(String, String)>,
    pub name: String,
}

/// Page fields as they come off the dump, before validation.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub id: Option<String>,
    pub title: Option<String>,
    pub text: Option<String>,
    /// Byte offset of the opening `<page>` tag in the (decompressed) stream
    pub position: u64,
}

#[derive(Debug, Clone)]
pub enum DumpItem {
    Namespaces(Vec<Namespace>),
    Page(RawPage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub id: u64,
    pub title: String,
    pub text: String,
}

/// Category name -> article ids assigned to it, restricted to reachable categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleIndex(BTreeMap<String, Vec<u64>>);

impl ArticleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: &str, id: u64) {
        match self.0.get_mut(category) {
            Some(ids) => ids.push(id),
            None => {
                self.0.insert(category.to_string(), vec![id]);
            }
        }
    }

    pub fn get(&self, category: &str) -> Option<&[u64]> {
        self.0.get(category).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u64])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn category_count(&self) -> usize {
        self.0.len()
    }

    /// Number of (category, id) pairs, duplicates included.
    pub fn pair_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Deduplicated union of all ids: the extraction filter.
    pub fn target_ids(&self) -> rustc_hash::FxHashSet<u64> {
        self.0.values().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_replaces_underscores() {
        assert_eq!(normalize("Computer_hardware"), "Computer hardware");
        assert_eq!(normalize("Plain"), "Plain");
    }

    #[test]
    fn target_ids_deduplicate_across_categories() {
        let mut index = ArticleIndex::new();
        index.push("A", 1);
        index.push("A", 2);
        index.push("B", 2);
        index.push("B", 3);

        assert_eq!(index.pair_count(), 4);
        let ids = index.target_ids();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&1) && ids.contains(&2) && ids.contains(&3));
    }

    #[test]
    fn article_index_serializes_as_plain_map() {
        let mut index = ArticleIndex::new();
        index.push("Hardware", 42);
        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(json, r#"{"Hardware":[42]}"#);
    }
}
