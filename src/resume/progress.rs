//! Per-destination retrieval progress

use std::collections::BTreeMap;

/// Samples already stored per source probe for one destination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalProgress {
    counts: BTreeMap<u32, usize>,
}

impl RetrievalProgress {
    /// Empty progress
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` stored samples for `source`
    pub fn record(&mut self, source: u32, n: usize) {
        if n > 0 {
            *self.counts.entry(source).or_insert(0) += n;
        }
    }

    /// Stored samples for `source`
    pub fn count(&self, source: u32) -> usize {
        self.counts.get(&source).copied().unwrap_or(0)
    }

    /// Total stored samples across all sources
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Sources with at least one stored sample
    pub fn sources(&self) -> usize {
        self.counts.len()
    }

    /// Expected sources still below `target`, in input order without duplicates
    pub fn todo(&self, expected_sources: &[u32], target: usize) -> Vec<u32> {
        let mut seen = std::collections::HashSet::with_capacity(expected_sources.len());
        expected_sources
            .iter()
            .copied()
            .filter(|&source| seen.insert(source) && self.count(source) < target)
            .collect()
    }
}
