use std::sync::atomic::{AtomicU64, Ordering};

/// Counters collected across the pipeline stages
#[derive(Default)]
pub struct PipelineStats {
    pub rows_read: AtomicU64,
    pub malformed_rows: AtomicU64,
    pub category_edges: AtomicU64,
    pub article_rows: AtomicU64,
    pub categories_reached: AtomicU64,
    pub pairs_collected: AtomicU64,
    pub unique_ids: AtomicU64,
    pub pages_scanned: AtomicU64,
    pub pages_extracted: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_rows(&self) {
        self.rows_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_malformed(&self) {
        self.malformed_rows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_category_edges(&self) {
        self.category_edges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_article_rows(&self) {
        self.article_rows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_categories_reached(&self, count: u64) {
        self.categories_reached.store(count, Ordering::Relaxed);
    }

    pub fn set_targets(&self, pairs: u64, unique: u64) {
        self.pairs_collected.store(pairs, Ordering::Relaxed);
        self.unique_ids.store(unique, Ordering::Relaxed);
    }

    pub fn inc_pages_scanned(&self) {
        self.pages_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pages_extracted(&self) {
        self.pages_extracted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rows(&self) -> u64 {
        self.rows_read.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed_rows.load(Ordering::Relaxed)
    }

    pub fn category_edges(&self) -> u64 {
        self.category_edges.load(Ordering::Relaxed)
    }

    pub fn article_rows(&self) -> u64 {
        self.article_rows.load(Ordering::Relaxed)
    }

    pub fn categories_reached(&self) -> u64 {
        self.categories_reached.load(Ordering::Relaxed)
    }

    pub fn pairs(&self) -> u64 {
        self.pairs_collected.load(Ordering::Relaxed)
    }

    pub fn unique_ids(&self) -> u64 {
        self.unique_ids.load(Ordering::Relaxed)
    }

    pub fn pages_scanned(&self) -> u64 {
        self.pages_scanned.load(Ordering::Relaxed)
    }

    pub fn pages_extracted(&self) -> u64 {
        self.pages_extracted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_zero() {
        let stats = PipelineStats::new();
        assert_eq!(stats.rows(), 0);
        assert_eq!(stats.malformed(), 0);
        assert_eq!(stats.category_edges(), 0);
        assert_eq!(stats.article_rows(), 0);
        assert_eq!(stats.categories_reached(), 0);
        assert_eq!(stats.pairs(), 0);
        assert_eq!(stats.unique_ids(), 0);
        assert_eq!(stats.pages_scanned(), 0);
        assert_eq!(stats.pages_extracted(), 0);
    }

    #[test]
    fn counters_accumulate() {
        let stats = PipelineStats::new();
        stats.inc_rows();
        stats.inc_rows();
        stats.inc_malformed();
        stats.inc_category_edges();
        stats.inc_article_rows();
        stats.inc_pages_scanned();
        stats.inc_pages_scanned();
        stats.inc_pages_extracted();

        assert_eq!(stats.rows(), 2);
        assert_eq!(stats.malformed(), 1);
        assert_eq!(stats.category_edges(), 1);
        assert_eq!(stats.article_rows(), 1);
        assert_eq!(stats.pages_scanned(), 2);
        assert_eq!(stats.pages_extracted(), 1);
    }

    #[test]
    fn setters_overwrite() {
        let stats = PipelineStats::new();
        stats.set_targets(10, 7);
        stats.set_targets(4, 3);
        stats.set_categories_reached(12);
        assert_eq!(stats.pairs(), 4);
        assert_eq!(stats.unique_ids(), 3);
        assert_eq!(stats.categories_reached(), 12);
    }
}
