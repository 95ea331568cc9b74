//! Cycle options and the structured per-cycle outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::collect::StrategySelection;
use crate::store::CycleRecord;

/// Options for one ingestion cycle.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    /// Compute everything but skip persistence and alert delivery
    pub dry_run: bool,
    /// Which collection strategies run
    pub selection: StrategySelection,
    /// Cooperative deadline; in-flight fetches finish, buffered events
    /// not yet persisted are discarded
    pub deadline: Option<Instant>,
    /// Override for the per-run article cap
    pub limit: Option<usize>,
    /// Whether the alert emitter runs
    pub alerts_enabled: bool,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            selection: StrategySelection::default(),
            deadline: None,
            limit: None,
            alerts_enabled: true,
        }
    }
}

/// Counters for one retrieval round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundStats {
    pub queries_run: usize,
    pub articles_fetched: usize,
    pub articles_admitted: usize,
    pub articles_relevant: usize,
    pub events_extracted: usize,
}

/// Structured outcome of one cycle. A cycle can complete with zero
/// events; it never raises to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub round1: RoundStats,
    pub round2: RoundStats,
    pub groups: usize,
    pub alerts: usize,
    /// round2 events relative to round1 events
    pub coverage_boost: f64,
    /// Whether the deadline expired mid-cycle
    pub cancelled: bool,
    /// Per-source and per-article diagnostics
    pub errors: Vec<String>,
}

impl CycleStats {
    pub fn begin() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            round1: RoundStats::default(),
            round2: RoundStats::default(),
            groups: 0,
            alerts: 0,
            coverage_boost: 0.0,
            cancelled: false,
            errors: Vec::new(),
        }
    }

    /// Finalize timing and the coverage-boost metric.
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
        self.coverage_boost =
            self.round2.events_extracted as f64 / self.round1.events_extracted.max(1) as f64;
    }

    pub fn total_events(&self) -> usize {
        self.round1.events_extracted + self.round2.events_extracted
    }

    /// Convert to the persisted cycle row.
    pub fn to_record(&self) -> CycleRecord {
        CycleRecord {
            started_at: self.started_at,
            finished_at: self.finished_at,
            round1_articles: self.round1.articles_fetched,
            round2_articles: self.round2.articles_fetched,
            round1_events: self.round1.events_extracted,
            round2_events: self.round2.events_extracted,
            groups: self.groups,
            alerts: self.alerts,
            coverage_boost: self.coverage_boost,
            errors: self.errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_boost_guards_division() {
        let mut stats = CycleStats::begin();
        stats.round2.events_extracted = 4;
        stats.finish();
        assert!((stats.coverage_boost - 4.0).abs() < 1e-9);

        let mut stats = CycleStats::begin();
        stats.round1.events_extracted = 12;
        stats.round2.events_extracted = 3;
        stats.finish();
        assert!((stats.coverage_boost - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_to_record_carries_counts() {
        let mut stats = CycleStats::begin();
        stats.round1.articles_fetched = 40;
        stats.round1.events_extracted = 8;
        stats.groups = 5;
        stats.finish();

        let record = stats.to_record();
        assert_eq!(record.round1_articles, 40);
        assert_eq!(record.round1_events, 8);
        assert_eq!(record.groups, 5);
    }
}
