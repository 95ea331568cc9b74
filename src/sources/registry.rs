//! Shared source registry with serialized health mutations.
//!
//! The registry is the only component with mutable state touched
//! concurrently; every mutation goes through one of the methods below and
//! readers get cloned snapshots.

use chrono::{Timelike, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::types::{normalize_name, FetchErrorKind, Source, SourceKind};

/// Health gained per successful fetch, scaled by the success weight.
const HEALTH_GAIN: f64 = 0.1;
/// Health lost per failed fetch.
const HEALTH_DECAY: f64 = 0.2;
/// Consecutive failures after which a source is deactivated.
const FAILURE_LIMIT: u32 = 10;

/// Filter for [`SourceRegistry::list`].
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    pub kind: Option<SourceKind>,
    pub language: Option<String>,
}

impl SourceFilter {
    pub fn kind(kind: SourceKind) -> Self {
        Self {
            kind: Some(kind),
            language: None,
        }
    }

    fn matches(&self, source: &Source) -> bool {
        if let Some(kind) = self.kind {
            if source.kind != kind {
                return false;
            }
        }
        if let Some(language) = &self.language {
            if &source.language != language {
                return false;
            }
        }
        true
    }
}

/// In-process catalog of sources keyed by normalized name.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registry from a source list.
    pub async fn with_sources(sources: Vec<Source>) -> Self {
        let registry = Self::new();
        for source in sources {
            registry.upsert(source).await;
        }
        registry
    }

    /// Active sources matching the filter.
    pub async fn list(&self, filter: &SourceFilter) -> Vec<Source> {
        let sources = self.sources.read().await;
        let mut out: Vec<Source> = sources
            .values()
            .filter(|s| s.active && filter.matches(s))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// All sources regardless of state, for operator listings.
    pub async fn snapshot(&self) -> Vec<Source> {
        let sources = self.sources.read().await;
        let mut out: Vec<Source> = sources.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn get(&self, name: &str) -> Option<Source> {
        let sources = self.sources.read().await;
        sources.get(&normalize_name(name)).cloned()
    }

    /// Insert or update keyed on normalized name. Updates refresh the
    /// descriptive metadata but keep accumulated health state; sources are
    /// never deleted. Returns the stored id.
    pub async fn upsert(&self, source: Source) -> String {
        let mut sources = self.sources.write().await;
        match sources.get_mut(&source.name) {
            Some(existing) => {
                existing.display_name = source.display_name;
                existing.endpoint = source.endpoint;
                existing.kind = source.kind;
                existing.language = source.language;
                existing.regions = source.regions;
                existing.reliability = source.reliability;
                existing.bias = source.bias;
                existing.rate_limit_per_hour = source.rate_limit_per_hour;
                existing.id.clone()
            }
            None => {
                let id = source.id.clone();
                sources.insert(source.name.clone(), source);
                id
            }
        }
    }

    /// Record a successful fetch: resets the failure streak, bumps the
    /// daily counter, and recovers health. A fetch that returned zero
    /// articles counts at half weight.
    pub async fn record_success(&self, name: &str, article_count: usize) {
        let mut sources = self.sources.write().await;
        let Some(source) = sources.get_mut(&normalize_name(name)) else {
            return;
        };
        Self::roll_day(source);

        let success_weight = if article_count > 0 { 1.0 } else { 0.5 };
        source.daily_access_count += 1;
        source.consecutive_failures = 0;
        source.health = (source.health + HEALTH_GAIN * success_weight).min(1.0);
        source.last_success = Some(Utc::now());
    }

    /// Record a failed fetch: health only ever decays on failure, and ten
    /// consecutive failures deactivate the source.
    pub async fn record_failure(&self, name: &str, kind: FetchErrorKind) {
        let mut sources = self.sources.write().await;
        let Some(source) = sources.get_mut(&normalize_name(name)) else {
            return;
        };
        Self::roll_day(source);

        source.consecutive_failures += 1;
        source.health = (source.health - HEALTH_DECAY).max(0.0);
        if source.consecutive_failures >= FAILURE_LIMIT {
            source.health = 0.0;
            if source.active {
                tracing::warn!(
                    source = %source.name,
                    failures = source.consecutive_failures,
                    error_kind = %kind,
                    "deactivating source after repeated failures"
                );
            }
            source.active = false;
        }
    }

    /// Whether the source may be fetched now. The hourly cap is projected
    /// across the hours elapsed today, so a source with a cap of 4/hour
    /// gets a budget of 4 at midnight growing to 96 by end of day.
    pub async fn check_rate_limit(&self, name: &str) -> bool {
        let mut sources = self.sources.write().await;
        let Some(source) = sources.get_mut(&normalize_name(name)) else {
            return false;
        };
        Self::roll_day(source);

        let hours_elapsed = Utc::now().hour() + 1;
        let budget = source.rate_limit_per_hour.saturating_mul(hours_elapsed);
        source.daily_access_count < budget
    }

    /// Operator-only reactivation of a deactivated source.
    pub async fn reactivate(&self, name: &str) -> bool {
        let mut sources = self.sources.write().await;
        let Some(source) = sources.get_mut(&normalize_name(name)) else {
            return false;
        };
        source.active = true;
        source.consecutive_failures = 0;
        source.health = 0.5;
        true
    }

    fn roll_day(source: &mut Source) {
        let today = Utc::now().date_naive();
        if source.access_day != today {
            source.access_day = today;
            source.daily_access_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rss_source(name: &str) -> Source {
        Source::new(name, format!("https://{}.example.com/rss", name), SourceKind::Rss)
    }

    #[tokio::test]
    async fn test_upsert_keyed_on_normalized_name() {
        let registry = SourceRegistry::new();
        let first_id = registry.upsert(rss_source("BBC News")).await;
        let second_id = registry
            .upsert(rss_source("bbc news").with_reliability(90.0))
            .await;

        assert_eq!(first_id, second_id);
        let stored = registry.get("BBC News").await.unwrap();
        assert_eq!(stored.reliability, 90.0);
    }

    #[tokio::test]
    async fn test_upsert_preserves_health_state() {
        let registry = SourceRegistry::new();
        registry.upsert(rss_source("Feed")).await;
        registry.record_failure("Feed", FetchErrorKind::Http5xx).await;
        registry.upsert(rss_source("Feed")).await;

        let stored = registry.get("Feed").await.unwrap();
        assert_eq!(stored.consecutive_failures, 1);
        assert!((stored.health - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_success_resets_failures_and_recovers_health() {
        let registry = SourceRegistry::new();
        registry.upsert(rss_source("Feed")).await;
        registry.record_failure("Feed", FetchErrorKind::Network).await;
        registry.record_failure("Feed", FetchErrorKind::Network).await;
        registry.record_success("Feed", 5).await;

        let stored = registry.get("Feed").await.unwrap();
        assert_eq!(stored.consecutive_failures, 0);
        assert!((stored.health - 0.7).abs() < 1e-9);
        assert!(stored.last_success.is_some());
        assert_eq!(stored.daily_access_count, 1);
    }

    #[tokio::test]
    async fn test_empty_fetch_recovers_at_half_weight() {
        let registry = SourceRegistry::new();
        registry.upsert(rss_source("Feed")).await;
        registry.record_failure("Feed", FetchErrorKind::Network).await;
        registry.record_success("Feed", 0).await;

        let stored = registry.get("Feed").await.unwrap();
        assert!((stored.health - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ten_failures_deactivate() {
        let registry = SourceRegistry::new();
        registry.upsert(rss_source("Flaky")).await;
        for _ in 0..10 {
            registry.record_failure("Flaky", FetchErrorKind::Http5xx).await;
        }

        let stored = registry.get("Flaky").await.unwrap();
        assert!(!stored.active);
        assert_eq!(stored.health, 0.0);
        assert!(registry
            .list(&SourceFilter::default())
            .await
            .iter()
            .all(|s| s.name != "flaky"));
    }

    #[tokio::test]
    async fn test_reactivation_restores() {
        let registry = SourceRegistry::new();
        registry.upsert(rss_source("Flaky")).await;
        for _ in 0..10 {
            registry.record_failure("Flaky", FetchErrorKind::Http5xx).await;
        }
        assert!(registry.reactivate("Flaky").await);

        let stored = registry.get("Flaky").await.unwrap();
        assert!(stored.active);
        assert_eq!(stored.consecutive_failures, 0);
        assert!(stored.health > 0.0);
    }

    #[tokio::test]
    async fn test_health_never_rises_on_failure() {
        let registry = SourceRegistry::new();
        registry.upsert(rss_source("Feed")).await;
        let mut last_health = registry.get("Feed").await.unwrap().health;
        for _ in 0..12 {
            registry.record_failure("Feed", FetchErrorKind::Timeout).await;
            let health = registry.get("Feed").await.unwrap().health;
            assert!(health <= last_health);
            last_health = health;
        }
    }

    #[tokio::test]
    async fn test_list_filters_by_kind() {
        let registry = SourceRegistry::new();
        registry.upsert(rss_source("Feed")).await;
        registry
            .upsert(Source::new("News API", "https://newsapi.org/v2", SourceKind::NewsApi))
            .await;

        let rss_only = registry.list(&SourceFilter::kind(SourceKind::Rss)).await;
        assert_eq!(rss_only.len(), 1);
        assert_eq!(rss_only[0].name, "feed");
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_over_budget() {
        let registry = SourceRegistry::new();
        registry.upsert(rss_source("Feed").with_rate_limit(0)).await;
        assert!(!registry.check_rate_limit("Feed").await);

        registry.upsert(rss_source("Open").with_rate_limit(1000)).await;
        assert!(registry.check_rate_limit("Open").await);
    }

    #[tokio::test]
    async fn test_unknown_source_is_blocked() {
        let registry = SourceRegistry::new();
        assert!(!registry.check_rate_limit("ghost").await);
    }
}
