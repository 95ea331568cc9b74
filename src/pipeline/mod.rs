//! Two-round ingestion orchestrator.
//!
//! One cycle runs its phases serially: broad collection, dedup and
//! filtering, extraction and georesolution, clustering, storage, entity
//! mining, a targeted second round, then alerting. Each phase fans out
//! internally under bounded concurrency; phase barriers keep the dedup
//! index authoritative. A cycle never raises to the scheduler: only
//! configuration errors and fatal storage outages escape.

pub mod queries;
pub mod stats;

pub use queries::{broad_queries, mine_entities, targeted_queries, MinedEntities};
pub use stats::{CycleOptions, CycleStats, RoundStats};

use chrono::Duration as ChronoDuration;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crate::alert::{AlertEmitter, LogSink, WebhookSink};
use crate::cluster::cluster_events;
use crate::collect::Collector;
use crate::config::Config;
use crate::dedup::DedupIndex;
use crate::error::Result;
use crate::extract::{EventExtractor, ExtractedEvent};
use crate::geo::{GeoResolver, HttpGeocoder};
use crate::llm::{build_client, ClientConfig, GatedClient};
use crate::model::{Article, Event};
use crate::sources::{default_sources, SourceRegistry};
use crate::store::EventStore;
use crate::text::{detect_language, score_relevance, EntityExtractor};

/// Drives the full ingestion cycle.
pub struct Orchestrator {
    config: Config,
    registry: Arc<SourceRegistry>,
    collector: Collector,
    entities: EntityExtractor,
    extractor: EventExtractor,
    resolver: GeoResolver,
    store: Arc<EventStore>,
    alerts: AlertEmitter,
}

impl Orchestrator {
    /// Assemble from pre-built components.
    pub fn new(
        config: Config,
        registry: Arc<SourceRegistry>,
        collector: Collector,
        extractor: EventExtractor,
        resolver: GeoResolver,
        store: Arc<EventStore>,
        alerts: AlertEmitter,
    ) -> Self {
        Self {
            config,
            registry,
            collector,
            entities: EntityExtractor::new(),
            extractor,
            resolver,
            store,
            alerts,
        }
    }

    /// Wire everything from configuration: open the store, seed the
    /// registry, and build the collection, extraction, resolution, and
    /// alerting components.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(EventStore::open(config.database.path())?);

        // Stored sources carry their accumulated health; seeds fill gaps.
        let stored = store.load_sources()?;
        let registry = Arc::new(SourceRegistry::with_sources(stored).await);
        for source in default_sources() {
            if registry.get(&source.name).await.is_none() {
                registry.upsert(source).await;
            }
        }

        let collector = Collector::from_config(&config, registry.clone());

        let extractor = if config.llm.api_key.is_empty() {
            EventExtractor::new()
        } else {
            let client = build_client(ClientConfig::new(&config.llm.api_key, &config.llm.model));
            let gated = Arc::new(GatedClient::new(client, config.llm.max_concurrent));
            EventExtractor::with_llm(gated)
        };

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        let resolver = GeoResolver::new().with_geocoder(Arc::new(HttpGeocoder::new(http.clone())));

        let mut alerts = AlertEmitter::new(config.alerts.clone()).with_sink(Arc::new(LogSink));
        if let Some(url) = &config.alerts.webhook_url {
            alerts = alerts.with_sink(Arc::new(WebhookSink::new(http, url)));
        }

        Ok(Self::new(config, registry, collector, extractor, resolver, store, alerts))
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    fn deadline_passed(options: &CycleOptions) -> bool {
        options.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run one full cycle. Two invocations in the same window produce the
    /// same persisted state: duplicates are absorbed by the dedup index
    /// and the store's uniqueness constraints.
    pub async fn run_cycle(&self, options: &CycleOptions) -> Result<CycleStats> {
        let mut stats = CycleStats::begin();
        self.alerts.reset();

        let window = ChronoDuration::hours(self.config.tunables.dedup_window_hours);
        let dedup = DedupIndex::new(window);
        let (urls, hashes) = self.store.recent_article_keys(window)?;
        dedup.preload(urls, hashes);

        // Round 1: broad retrieval over the configured conflict zones.
        let round1_queries = queries::broad_queries(&self.config.conflict_zones);
        let round1_events = self
            .run_round(1, &round1_queries, &dedup, options, &mut stats)
            .await?;

        // Round 2: targeted retrieval from mined entities. Runs at most
        // once, only when round 1 produced events.
        let mut round2_events = Vec::new();
        if self.config.tunables.round2_enabled
            && !round1_events.is_empty()
            && !Self::deadline_passed(options)
        {
            let mined = queries::mine_entities(&round1_events);
            let seen: HashSet<String> = round1_queries.iter().cloned().collect();
            let round2_queries = queries::targeted_queries(&mined, &seen);
            if !round2_queries.is_empty() {
                round2_events = self
                    .run_round(2, &round2_queries, &dedup, options, &mut stats)
                    .await?;
            }
        }

        if options.alerts_enabled && !options.dry_run {
            for event in round1_events.iter().chain(round2_events.iter()) {
                if self.alerts.emit(event).await {
                    stats.alerts += 1;
                }
            }
        }

        if !options.dry_run {
            // Persist accumulated source health for the next cycle.
            for source in self.registry.snapshot().await {
                self.store.upsert_source(&source)?;
            }
        }

        stats.finish();
        if !options.dry_run {
            self.store.record_cycle(&stats.to_record())?;
        }

        tracing::info!(
            round1_articles = stats.round1.articles_fetched,
            round2_articles = stats.round2.articles_fetched,
            round1_events = stats.round1.events_extracted,
            round2_events = stats.round2.events_extracted,
            groups = stats.groups,
            alerts = stats.alerts,
            coverage_boost = stats.coverage_boost,
            cancelled = stats.cancelled,
            "cycle complete"
        );
        Ok(stats)
    }

    async fn run_round(
        &self,
        round: u8,
        round_queries: &[String],
        dedup: &DedupIndex,
        options: &CycleOptions,
        stats: &mut CycleStats,
    ) -> Result<Vec<Event>> {
        let outcome = self
            .collector
            .collect(round_queries, round, options.selection, options.deadline)
            .await;

        for audit in &outcome.audits {
            if !options.dry_run {
                self.store.append_query_audit(audit)?;
            }
        }
        for err in &outcome.errors {
            stats.errors.push(format!("{}: {}", err.source, err.message));
        }

        let mut articles = outcome.articles;
        if let Some(limit) = options.limit {
            articles.truncate(limit);
        }

        let mut round_stats = RoundStats {
            queries_run: outcome.audits.len(),
            articles_fetched: articles.len(),
            ..RoundStats::default()
        };

        let events = self
            .process_articles(articles, round, dedup, options, &mut round_stats, stats)
            .await?;

        if round == 1 {
            stats.round1 = round_stats;
        } else {
            stats.round2 = round_stats;
        }
        Ok(events)
    }

    /// Processing phase over a pre-collected article set: dedup,
    /// relevance filter, extraction, georesolution, clustering, and
    /// storage (articles, then events, then groups).
    pub async fn process_articles(
        &self,
        articles: Vec<Article>,
        round: u8,
        dedup: &DedupIndex,
        options: &CycleOptions,
        round_stats: &mut RoundStats,
        stats: &mut CycleStats,
    ) -> Result<Vec<Event>> {
        let mut admitted = Vec::new();
        let mut events: Vec<Event> = Vec::new();
        let mut source_of: HashMap<String, String> = HashMap::new();

        for article in articles {
            if Self::deadline_passed(options) {
                stats.cancelled = true;
                break;
            }

            // Rolling cache plus read-through against the articles table.
            if self.store.article_exists(&article.content_hash)? {
                continue;
            }
            if !dedup.admit(&article) {
                continue;
            }
            round_stats.articles_admitted += 1;
            source_of.insert(article.content_hash.clone(), article.source_id.clone());
            admitted.push(article.clone());

            let text = article.text();
            let relevance = score_relevance(&text);
            if relevance < self.config.tunables.relevance_threshold {
                continue;
            }
            round_stats.articles_relevant += 1;

            let language = detect_language(&text);
            let entities = self.entities.extract(&text);
            let extracted = self.extractor.extract(&article, &entities).await;

            let source_reliability = self
                .registry
                .get(&article.source_id)
                .await
                .map(|s| s.reliability_unit())
                .unwrap_or(0.5);

            for ExtractedEvent {
                mut event,
                location_hint,
            } in extracted
            {
                event.reliability = source_reliability;
                event.tags.push(format!("lang:{}", language));
                event.location = self.resolver.resolve(&text, location_hint.as_deref()).await;

                if event.location.is_none() && self.config.tunables.require_location {
                    tracing::debug!(
                        article = %article.content_hash,
                        "dropping locationless event"
                    );
                    stats
                        .errors
                        .push(format!("{}: unresolved location", article.content_hash));
                    continue;
                }
                events.push(event);
            }
        }

        // Cancellation before persistence discards buffered results; the
        // next cycle re-fetches and the dedup index absorbs the overlap.
        if Self::deadline_passed(options) {
            stats.cancelled = true;
            return Ok(Vec::new());
        }

        round_stats.events_extracted = events.len();

        let groups = cluster_events(
            &mut events,
            self.config.tunables.similarity_threshold,
            &source_of,
        );
        stats.groups += groups.len();

        if !options.dry_run {
            for article in &admitted {
                self.store.upsert_article(article)?;
            }
            self.store.insert_events(&events)?;
            self.store.insert_event_groups(&groups)?;
        }

        tracing::debug!(
            round,
            admitted = round_stats.articles_admitted,
            relevant = round_stats.articles_relevant,
            events = events.len(),
            groups = groups.len(),
            "round processed"
        );
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::CollectorConfig;
    use crate::config::Config;
    use crate::model::Severity;
    use crate::sources::{Source, SourceKind};
    use chrono::{TimeZone, Utc};

    fn test_config() -> Config {
        let env = HashMap::from([
            ("DB_URL", ":memory:"),
            ("LLM_API_KEY", "test"),
            ("SEARCH_API_KEY", "test"),
            ("SEARCH_ENGINE_ID", "test"),
            ("NEWS_API_KEY", "test"),
        ]);
        Config::from_lookup(move |key| env.get(key).map(|v| v.to_string())).unwrap()
    }

    async fn test_orchestrator() -> Orchestrator {
        let config = test_config();
        let registry = Arc::new(
            SourceRegistry::with_sources(vec![
                Source::new("Reuters World", "https://reuters.example/rss", SourceKind::Rss)
                    .with_reliability(95.0),
                Source::new("BBC World", "https://bbc.example/rss", SourceKind::Rss)
                    .with_reliability(90.0),
            ])
            .await,
        );
        let collector = Collector::new(
            registry.clone(),
            reqwest::Client::new(),
            CollectorConfig::from_config(&config),
        );
        let store = Arc::new(EventStore::in_memory().unwrap());
        let alerts = AlertEmitter::new(config.alerts.clone());

        Orchestrator::new(
            config,
            registry,
            collector,
            EventExtractor::new(),
            GeoResolver::new(),
            store,
            alerts,
        )
    }

    fn strike_article(source: &str, url: &str, minute: u32, body: &str) -> Article {
        Article::new(
            url,
            "Drone strike on Kharkiv power substations",
            body,
            Utc.with_ymd_and_hms(2024, 3, 12, 10, minute, 0).unwrap(),
            source,
            1,
            "ukraine strike",
        )
    }

    const STRIKE_BODY_A: &str = "A drone strike in Kharkiv hit power substations on Tuesday, \
        officials said. The Russian Army launched the attack and 3 people were killed.";
    const STRIKE_BODY_B: &str = "Power substations in Kharkiv were struck by drones, with the \
        attack attributed to the Russian Army; 3 people were killed, officials said.";

    #[tokio::test]
    async fn test_two_sources_one_event() {
        let orchestrator = test_orchestrator().await;
        let dedup = DedupIndex::new(ChronoDuration::hours(24));
        let options = CycleOptions::default();
        let mut stats = CycleStats::begin();
        let mut round_stats = RoundStats::default();

        let articles = vec![
            strike_article("reuters_world", "https://reuters.example/a", 0, STRIKE_BODY_A),
            strike_article("bbc_world", "https://bbc.example/b", 40, STRIKE_BODY_B),
        ];

        let events = orchestrator
            .process_articles(articles, 1, &dedup, &options, &mut round_stats, &mut stats)
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(stats.groups, 1);

        let store = orchestrator.store();
        assert_eq!(store.article_count().unwrap(), 2);
        assert_eq!(store.event_count().unwrap(), 2);

        let groups = store.load_event_groups().unwrap();
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.corroboration_count, 2);
        assert!((group.source_diversity - 1.0).abs() < 1e-9);
        assert!(group.corroborated);

        // Primary is the event from the higher-reliability source.
        let primary = events
            .iter()
            .find(|e| e.id == group.primary_event_id)
            .unwrap();
        assert!((primary.reliability - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let orchestrator = test_orchestrator().await;
        let options = CycleOptions::default();

        let articles = || {
            vec![
                strike_article("reuters_world", "https://reuters.example/a", 0, STRIKE_BODY_A),
                strike_article("bbc_world", "https://bbc.example/b", 40, STRIKE_BODY_B),
            ]
        };

        let dedup = DedupIndex::new(ChronoDuration::hours(24));
        let mut stats = CycleStats::begin();
        let mut rs = RoundStats::default();
        orchestrator
            .process_articles(articles(), 1, &dedup, &options, &mut rs, &mut stats)
            .await
            .unwrap();

        let store = orchestrator.store();
        let articles_before = store.article_count().unwrap();
        let events_before = store.event_count().unwrap();

        // Second run five minutes later: a fresh dedup index reads
        // through the store, so nothing new lands.
        let dedup2 = DedupIndex::new(ChronoDuration::hours(24));
        let (urls, hashes) = store.recent_article_keys(ChronoDuration::hours(24)).unwrap();
        dedup2.preload(urls, hashes);

        let mut stats2 = CycleStats::begin();
        let mut rs2 = RoundStats::default();
        let events2 = orchestrator
            .process_articles(articles(), 1, &dedup2, &options, &mut rs2, &mut stats2)
            .await
            .unwrap();

        assert!(events2.is_empty());
        assert_eq!(rs2.articles_admitted, 0);
        assert_eq!(store.article_count().unwrap(), articles_before);
        assert_eq!(store.event_count().unwrap(), events_before);
    }

    #[tokio::test]
    async fn test_locationless_events_dropped_when_required() {
        let orchestrator = test_orchestrator().await;
        let dedup = DedupIndex::new(ChronoDuration::hours(24));
        let options = CycleOptions::default();
        let mut stats = CycleStats::begin();
        let mut rs = RoundStats::default();

        // Conflict text with no resolvable place name.
        let article = Article::new(
            "https://reuters.example/nowhere",
            "Clashes reported",
            "Heavy gunfire and shelling were reported; troops clashed with militants and \
             2 people were killed, officials said, as artillery attacks continued.",
            Utc::now(),
            "reuters_world",
            1,
            "q",
        );

        let events = orchestrator
            .process_articles(vec![article], 1, &dedup, &options, &mut rs, &mut stats)
            .await
            .unwrap();

        assert!(events.is_empty());
        assert_eq!(rs.articles_relevant, 1);
        assert!(stats.errors.iter().any(|e| e.contains("unresolved location")));
        // The article itself still lands for dedup across runs.
        assert_eq!(orchestrator.store().article_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_irrelevant_articles_filtered() {
        let orchestrator = test_orchestrator().await;
        let dedup = DedupIndex::new(ChronoDuration::hours(24));
        let options = CycleOptions::default();
        let mut stats = CycleStats::begin();
        let mut rs = RoundStats::default();

        let article = Article::new(
            "https://reuters.example/culture",
            "Museum reopens",
            "The museum reopened after renovation with a new wing.",
            Utc::now(),
            "reuters_world",
            1,
            "q",
        );

        let events = orchestrator
            .process_articles(vec![article], 1, &dedup, &options, &mut rs, &mut stats)
            .await
            .unwrap();

        assert!(events.is_empty());
        assert_eq!(rs.articles_admitted, 1);
        assert_eq!(rs.articles_relevant, 0);
    }

    #[tokio::test]
    async fn test_dry_run_persists_nothing() {
        let orchestrator = test_orchestrator().await;
        let dedup = DedupIndex::new(ChronoDuration::hours(24));
        let options = CycleOptions {
            dry_run: true,
            ..Default::default()
        };
        let mut stats = CycleStats::begin();
        let mut rs = RoundStats::default();

        let articles = vec![strike_article(
            "reuters_world",
            "https://reuters.example/a",
            0,
            STRIKE_BODY_A,
        )];
        let events = orchestrator
            .process_articles(articles, 1, &dedup, &options, &mut rs, &mut stats)
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        let store = orchestrator.store();
        assert_eq!(store.article_count().unwrap(), 0);
        assert_eq!(store.event_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_deadline_discards_buffered_events() {
        let orchestrator = test_orchestrator().await;
        let dedup = DedupIndex::new(ChronoDuration::hours(24));
        let options = CycleOptions {
            deadline: Some(Instant::now() - std::time::Duration::from_secs(1)),
            ..Default::default()
        };
        let mut stats = CycleStats::begin();
        let mut rs = RoundStats::default();

        let articles = vec![strike_article(
            "reuters_world",
            "https://reuters.example/a",
            0,
            STRIKE_BODY_A,
        )];
        let events = orchestrator
            .process_articles(articles, 1, &dedup, &options, &mut rs, &mut stats)
            .await
            .unwrap();

        assert!(events.is_empty());
        assert!(stats.cancelled);
        assert_eq!(orchestrator.store().event_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_cycle_with_no_reachable_sources_completes() {
        // No search/news clients and no reachable feeds: the cycle
        // completes with zero events and still records its stats row.
        let orchestrator = test_orchestrator().await;
        // Deactivate the seeded feeds so the collector has nothing to do.
        for source in orchestrator.registry().snapshot().await {
            for _ in 0..10 {
                orchestrator
                    .registry()
                    .record_failure(&source.name, crate::sources::FetchErrorKind::Network)
                    .await;
            }
        }

        let stats = orchestrator
            .run_cycle(&CycleOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.total_events(), 0);
        assert_eq!(stats.round2.queries_run, 0);
        assert_eq!(orchestrator.store().cycle_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_severity_consistency_persisted() {
        let orchestrator = test_orchestrator().await;
        let dedup = DedupIndex::new(ChronoDuration::hours(24));
        let options = CycleOptions::default();
        let mut stats = CycleStats::begin();
        let mut rs = RoundStats::default();

        let article = Article::new(
            "https://reuters.example/nuclear",
            "Reports of tactical nuclear exchange near Bakhmut",
            "Unconfirmed reports describe a tactical nuclear exchange near Bakhmut. Officials \
             said 40 soldiers were killed as shelling, missile fire, and drone attacks continued.",
            Utc::now(),
            "reuters_world",
            1,
            "q",
        );

        let events = orchestrator
            .process_articles(vec![article], 1, &dedup, &options, &mut rs, &mut stats)
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        let stored = orchestrator
            .store()
            .get_event(&events[0].id)
            .unwrap()
            .unwrap();
        assert!(stored.escalation_score >= 8);
        assert_eq!(stored.severity, Severity::Critical);
        assert_eq!(
            stored.severity,
            Severity::from_escalation(stored.escalation_score)
        );
        // Location came from the verified hotspot table.
        let location = stored.location.unwrap();
        assert_eq!(location.country, "Ukraine");
    }
}
