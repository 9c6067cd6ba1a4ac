//! Lazy-load N+1 detection.
//!
//! Reading a relationship that has not been loaded issues one query per
//! record. Doing that in a loop over N records is the N+1 pattern; the fix is
//! to pass the relationship as an `include` so it is loaded in one batch.
//!
//! ```ignore
//! for book in &mut books {
//!     book.related("author")?; // one query per book
//! }
//!
//! let books = Book.all(FindOptions::new().include("author"))?; // two queries
//! ```
//!
//! The [`Registry`](crate::Registry) owns one tracker and feeds it every lazy
//! load.

use std::collections::HashMap;

/// Where a lazy load was triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub class: String,
    pub relationship: String,
    pub file: &'static str,
    pub line: u32,
}

/// Summary of recorded lazy loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct N1Stats {
    /// Lazy loads recorded since the last reset.
    pub total_loads: usize,
    /// Distinct `(class, relationship)` pairs loaded.
    pub relationships_loaded: usize,
    /// Pairs whose load count reached the threshold.
    pub potential_n1: usize,
}

/// Counts lazy loads per `(class, relationship)` pair.
#[derive(Debug)]
pub struct N1QueryTracker {
    counts: HashMap<(String, String), usize>,
    threshold: usize,
    enabled: bool,
    call_sites: Vec<CallSite>,
}

impl Default for N1QueryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl N1QueryTracker {
    /// Tracker warning at the third load of the same relationship.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            enabled: true,
            call_sites: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Record one lazy load of `relationship` on a `class` record.
    #[track_caller]
    pub fn record_load(&mut self, class: &str, relationship: &str) {
        if !self.enabled {
            return;
        }

        let count = self
            .counts
            .entry((class.to_string(), relationship.to_string()))
            .or_insert(0);
        *count += 1;
        let count = *count;

        let caller = std::panic::Location::caller();
        self.call_sites.push(CallSite {
            class: class.to_string(),
            relationship: relationship.to_string(),
            file: caller.file(),
            line: caller.line(),
        });

        if count == self.threshold {
            self.emit_warning(class, relationship, count);
        }
    }

    fn emit_warning(&self, class: &str, relationship: &str, count: usize) {
        tracing::warn!(
            target: "activerow::n1",
            class = class,
            relationship = relationship,
            queries = count,
            threshold = self.threshold,
            "N+1 query pattern detected; include the relationship in the finder options to load it in one query"
        );

        let sites = self
            .call_sites
            .iter()
            .filter(|s| s.class == class && s.relationship == relationship)
            .take(5);
        for (i, site) in sites.enumerate() {
            tracing::debug!(
                target: "activerow::n1",
                index = i,
                file = site.file,
                line = site.line,
                "lazy load call site"
            );
        }
    }

    /// Forget every recorded load.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.call_sites.clear();
    }

    /// Loads recorded for one pair.
    pub fn count_for(&self, class: &str, relationship: &str) -> usize {
        self.counts
            .get(&(class.to_string(), relationship.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> N1Stats {
        N1Stats {
            total_loads: self.counts.values().sum(),
            relationships_loaded: self.counts.len(),
            potential_n1: self.counts.values().filter(|c| **c >= self.threshold).count(),
        }
    }

    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_defaults() {
        let tracker = N1QueryTracker::new();
        assert_eq!(tracker.threshold(), 3);
        assert!(tracker.is_enabled());
        assert_eq!(tracker.stats(), N1Stats::default());
    }

    #[test]
    fn test_record_load_counts_per_pair() {
        let mut tracker = N1QueryTracker::new();
        tracker.record_load("Book", "author");
        tracker.record_load("Book", "author");
        tracker.record_load("Venue", "events");
        assert_eq!(tracker.count_for("Book", "author"), 2);
        assert_eq!(tracker.count_for("Venue", "events"), 1);
        assert_eq!(tracker.count_for("Venue", "hosts"), 0);
        assert_eq!(tracker.call_sites().len(), 3);
    }

    #[test]
    fn test_stats_flag_pairs_at_threshold() {
        let mut tracker = N1QueryTracker::new().with_threshold(2);
        tracker.record_load("Book", "author");
        tracker.record_load("Book", "author");
        tracker.record_load("Venue", "events");
        let stats = tracker.stats();
        assert_eq!(stats.total_loads, 3);
        assert_eq!(stats.relationships_loaded, 2);
        assert_eq!(stats.potential_n1, 1);
    }

    #[test]
    fn test_disabled_tracker_records_nothing() {
        let mut tracker = N1QueryTracker::new();
        tracker.set_enabled(false);
        tracker.record_load("Book", "author");
        assert_eq!(tracker.stats().total_loads, 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tracker = N1QueryTracker::new();
        tracker.record_load("Book", "author");
        tracker.reset();
        assert_eq!(tracker.stats(), N1Stats::default());
        assert!(tracker.call_sites().is_empty());
    }

    #[test]
    fn test_call_site_points_at_caller() {
        let mut tracker = N1QueryTracker::new();
        tracker.record_load("Book", "author");
        assert!(tracker.call_sites()[0].file.ends_with("n1_detection.rs"));
    }
}
