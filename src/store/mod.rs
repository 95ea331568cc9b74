//! SQLite-backed event store.
//!
//! Write ordering within a cycle is articles, then events, then groups;
//! each batch commits atomically and a failed batch is retried once
//! before its contents are serialized to the offline spool.

pub mod schema;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::model::{
    Article, Event, EventGroup, EventType, LocationMethod, QueryAudit, ResolvedLocation,
    Severity, TimestampConfidence,
};
use crate::sources::{Source, SourceKind};

use schema::{initialize_schema, is_initialized};

/// Maximum rows per insert batch.
pub const BATCH_SIZE: usize = 50;

/// Per-cycle stats row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub round1_articles: usize,
    pub round2_articles: usize,
    pub round1_events: usize,
    pub round2_events: usize,
    pub groups: usize,
    pub alerts: usize,
    pub coverage_boost: f64,
    pub errors: Vec<String>,
}

/// Filter for stored-event queries.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub min_severity: Option<Severity>,
    pub min_escalation: Option<u8>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// SQLite-backed store for sources, articles, events, and groups.
pub struct EventStore {
    conn: Arc<Mutex<Connection>>,
    spool_path: Option<PathBuf>,
}

impl EventStore {
    /// Open or create a store at the given path. The offline spool lives
    /// next to the database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;

        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::Storage(e.to_string()))?;
        }

        let spool_path = Some(PathBuf::from(format!("{}.spool.jsonl", path.display())));
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            spool_path,
        })
    }

    /// Create an in-memory store (for testing). No spool is attached.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::Storage(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            spool_path: None,
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(|e| Error::Storage(e.to_string()))
    }

    // ==================== Sources ====================

    /// Insert or update a source, keyed on normalized name.
    pub fn upsert_source(&self, source: &Source) -> Result<()> {
        let regions = serde_json::to_string(&source.regions)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sources (
                    name, id, display_name, endpoint, kind, language, regions,
                    reliability, bias, rate_limit_per_hour, health,
                    consecutive_failures, last_success, daily_access_count,
                    access_day, active
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                ON CONFLICT(name) DO UPDATE SET
                    display_name = excluded.display_name,
                    endpoint = excluded.endpoint,
                    kind = excluded.kind,
                    language = excluded.language,
                    regions = excluded.regions,
                    reliability = excluded.reliability,
                    bias = excluded.bias,
                    rate_limit_per_hour = excluded.rate_limit_per_hour,
                    health = excluded.health,
                    consecutive_failures = excluded.consecutive_failures,
                    last_success = excluded.last_success,
                    daily_access_count = excluded.daily_access_count,
                    access_day = excluded.access_day,
                    active = excluded.active",
                params![
                    source.name,
                    source.id,
                    source.display_name,
                    source.endpoint,
                    source.kind.as_str(),
                    source.language,
                    regions,
                    source.reliability,
                    source.bias,
                    source.rate_limit_per_hour,
                    source.health,
                    source.consecutive_failures,
                    source.last_success.map(|t| t.to_rfc3339()),
                    source.daily_access_count,
                    source.access_day.to_string(),
                    source.active as i32,
                ],
            )?;
            Ok(())
        })
    }

    /// Load all stored sources.
    pub fn load_sources(&self) -> Result<Vec<Source>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, id, display_name, endpoint, kind, language, regions,
                        reliability, bias, rate_limit_per_hour, health,
                        consecutive_failures, last_success, daily_access_count,
                        access_day, active
                 FROM sources ORDER BY name",
            )?;
            let rows = stmt.query_map([], Self::row_to_source)?;
            rows.collect()
        })
    }

    fn row_to_source(row: &Row<'_>) -> rusqlite::Result<Source> {
        let regions_json: Option<String> = row.get(6)?;
        let last_success: Option<String> = row.get(12)?;
        let access_day: String = row.get(14)?;
        Ok(Source {
            name: row.get(0)?,
            id: row.get(1)?,
            display_name: row.get(2)?,
            endpoint: row.get(3)?,
            kind: SourceKind::parse(&row.get::<_, String>(4)?),
            language: row.get(5)?,
            regions: regions_json
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_default(),
            reliability: row.get(7)?,
            bias: row.get(8)?,
            rate_limit_per_hour: row.get(9)?,
            health: row.get(10)?,
            consecutive_failures: row.get(11)?,
            last_success: last_success
                .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                .map(|t| t.with_timezone(&Utc)),
            daily_access_count: row.get(13)?,
            access_day: access_day.parse::<NaiveDate>().unwrap_or_else(|_| Utc::now().date_naive()),
            active: row.get::<_, i32>(15)? != 0,
        })
    }

    // ==================== Articles ====================

    /// Insert an article keyed on content hash. A duplicate silently
    /// resolves to the existing id.
    pub fn upsert_article(&self, article: &Article) -> Result<String> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO articles_raw (
                    content_hash, url, headline, body, published, source_id, round, query
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(content_hash) DO NOTHING",
                params![
                    article.content_hash,
                    article.url,
                    article.headline,
                    article.body,
                    article.published.to_rfc3339(),
                    article.source_id,
                    article.round,
                    article.query,
                ],
            )?;
            Ok(article.content_hash.clone())
        })
    }

    /// Whether an article with this content hash is stored.
    pub fn article_exists(&self, content_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT 1 FROM articles_raw WHERE content_hash = ?1",
                params![content_hash],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
        })
    }

    pub fn article_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM articles_raw", [], |row| row.get(0))
        })
    }

    /// URLs and content hashes of articles created within the window,
    /// used to preload the dedup index.
    pub fn recent_article_keys(&self, window: Duration) -> Result<(Vec<String>, Vec<String>)> {
        let cutoff = (Utc::now() - window).to_rfc3339();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT url, content_hash FROM articles_raw WHERE created_at >= ?1",
            )?;
            let mut urls = Vec::new();
            let mut hashes = Vec::new();
            let mut rows = stmt.query(params![cutoff])?;
            while let Some(row) = rows.next()? {
                urls.push(row.get(0)?);
                hashes.push(row.get(1)?);
            }
            Ok((urls, hashes))
        })
    }

    // ==================== Events ====================

    fn insert_event_batch(&self, events: &[Event]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for event in events {
                let (lat, lng, location_name, country, region, method, location_confidence) =
                    match &event.location {
                        Some(loc) => (
                            Some(loc.lat),
                            Some(loc.lng),
                            Some(loc.name.clone()),
                            Some(loc.country.clone()),
                            Some(loc.region.clone()),
                            loc.method.as_str(),
                            loc.confidence,
                        ),
                        None => (None, None, None, None, None, LocationMethod::Unresolved.as_str(), 0.0),
                    };

                tx.execute(
                    "INSERT OR REPLACE INTO events (
                        id, title, enhanced_headline, timestamp, timestamp_confidence,
                        lat, lng, location_name, country, region, location_method,
                        location_confidence, event_type, severity, escalation_score,
                        casualties, primary_actors, weapon_types, article_ids,
                        reliability, tags, group_id
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                              ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
                    params![
                        event.id,
                        event.title,
                        event.enhanced_headline,
                        event.timestamp.to_rfc3339(),
                        event.timestamp_confidence.as_str(),
                        lat,
                        lng,
                        location_name,
                        country,
                        region,
                        method,
                        location_confidence,
                        event.event_type.as_str(),
                        event.severity.as_str(),
                        event.escalation_score,
                        serde_json::to_string(&event.casualties).unwrap_or_else(|_| "{}".into()),
                        serde_json::to_string(&event.primary_actors).unwrap_or_else(|_| "[]".into()),
                        serde_json::to_string(&event.weapon_types).unwrap_or_else(|_| "[]".into()),
                        serde_json::to_string(&event.article_ids).unwrap_or_else(|_| "[]".into()),
                        event.reliability,
                        serde_json::to_string(&event.tags).unwrap_or_else(|_| "[]".into()),
                        event.group_id,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Insert events in batches of at most [`BATCH_SIZE`]. Each batch is
    /// atomic; a failed batch is retried once and then spooled.
    pub fn insert_events(&self, events: &[Event]) -> Result<()> {
        for chunk in events.chunks(BATCH_SIZE) {
            if let Err(first) = self.insert_event_batch(chunk) {
                tracing::warn!("event batch failed, retrying once: {}", first);
                if let Err(second) = self.insert_event_batch(chunk) {
                    tracing::error!("event batch skipped after retry: {}", second);
                    self.spool("events", chunk);
                }
            }
        }
        Ok(())
    }

    fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
        let lat: Option<f64> = row.get(5)?;
        let lng: Option<f64> = row.get(6)?;
        let location = match (lat, lng) {
            (Some(lat), Some(lng)) => Some(ResolvedLocation {
                lat,
                lng,
                name: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                country: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                region: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                method: LocationMethod::parse(&row.get::<_, String>(10)?),
                confidence: row.get(11)?,
            }),
            _ => None,
        };

        let timestamp: String = row.get(3)?;
        Ok(Event {
            id: row.get(0)?,
            title: row.get(1)?,
            enhanced_headline: row.get(2)?,
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            timestamp_confidence: TimestampConfidence::parse(&row.get::<_, String>(4)?),
            location,
            event_type: EventType::parse(&row.get::<_, String>(12)?),
            severity: Severity::parse(&row.get::<_, String>(13)?),
            escalation_score: row.get(14)?,
            casualties: serde_json::from_str(&row.get::<_, String>(15)?).unwrap_or_default(),
            primary_actors: serde_json::from_str(&row.get::<_, String>(16)?).unwrap_or_default(),
            weapon_types: serde_json::from_str(&row.get::<_, String>(17)?).unwrap_or_default(),
            article_ids: serde_json::from_str(&row.get::<_, String>(18)?).unwrap_or_default(),
            reliability: row.get(19)?,
            tags: serde_json::from_str(&row.get::<_, String>(20)?).unwrap_or_default(),
            group_id: row.get(21)?,
        })
    }

    const EVENT_COLUMNS: &'static str =
        "id, title, enhanced_headline, timestamp, timestamp_confidence, lat, lng,
         location_name, country, region, location_method, location_confidence,
         event_type, severity, escalation_score, casualties, primary_actors,
         weapon_types, article_ids, reliability, tags, group_id";

    pub fn get_event(&self, id: &str) -> Result<Option<Event>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM events WHERE id = ?1", Self::EVENT_COLUMNS),
                params![id],
                Self::row_to_event,
            )
            .optional()
        })
    }

    pub fn event_count(&self) -> Result<u64> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0)))
    }

    /// Events at or above the escalation score, newest first. Feeds the
    /// alert path.
    pub fn high_escalation_snapshot(&self, min_score: u8) -> Result<Vec<Event>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM events WHERE escalation_score >= ?1 ORDER BY timestamp DESC",
                Self::EVENT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![min_score], Self::row_to_event)?;
            rows.collect()
        })
    }

    /// Query stored events with the CLI read filters.
    pub fn query_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT {} FROM events WHERE 1=1", Self::EVENT_COLUMNS);
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(min_severity) = filter.min_severity {
                let allowed: Vec<String> = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical]
                    .iter()
                    .filter(|s| **s >= min_severity)
                    .map(|s| format!("'{}'", s.as_str()))
                    .collect();
                sql.push_str(&format!(" AND severity IN ({})", allowed.join(",")));
            }

            if let Some(min_escalation) = filter.min_escalation {
                sql.push_str(" AND escalation_score >= ?");
                params_vec.push(Box::new(min_escalation));
            }

            if let Some(since) = filter.since {
                sql.push_str(" AND timestamp >= ?");
                params_vec.push(Box::new(since.to_rfc3339()));
            }

            sql.push_str(" ORDER BY timestamp DESC");

            if let Some(limit) = filter.limit {
                sql.push_str(&format!(" LIMIT {}", limit));
            }

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_refs.as_slice(), Self::row_to_event)?;
            rows.collect()
        })
    }

    // ==================== Event groups ====================

    fn insert_group_batch(&self, groups: &[EventGroup]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for group in groups {
                tx.execute(
                    "INSERT OR REPLACE INTO event_groups (
                        id, member_event_ids, primary_event_id, confidence,
                        corroboration_count, source_diversity, corroborated
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        group.id,
                        serde_json::to_string(&group.member_event_ids)
                            .unwrap_or_else(|_| "[]".into()),
                        group.primary_event_id,
                        group.confidence,
                        group.corroboration_count,
                        group.source_diversity,
                        group.corroborated as i32,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Insert groups in batches with the same retry-then-spool policy as
    /// events.
    pub fn insert_event_groups(&self, groups: &[EventGroup]) -> Result<()> {
        for chunk in groups.chunks(BATCH_SIZE) {
            if let Err(first) = self.insert_group_batch(chunk) {
                tracing::warn!("group batch failed, retrying once: {}", first);
                if let Err(second) = self.insert_group_batch(chunk) {
                    tracing::error!("group batch skipped after retry: {}", second);
                    self.spool("event_groups", chunk);
                }
            }
        }
        Ok(())
    }

    pub fn load_event_groups(&self) -> Result<Vec<EventGroup>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, member_event_ids, primary_event_id, confidence,
                        corroboration_count, source_diversity, corroborated
                 FROM event_groups ORDER BY created_at",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(EventGroup {
                    id: row.get(0)?,
                    member_event_ids: serde_json::from_str(&row.get::<_, String>(1)?)
                        .unwrap_or_default(),
                    primary_event_id: row.get(2)?,
                    confidence: row.get(3)?,
                    corroboration_count: row.get::<_, i64>(4)? as usize,
                    source_diversity: row.get(5)?,
                    corroborated: row.get::<_, i32>(6)? != 0,
                })
            })?;
            rows.collect()
        })
    }

    // ==================== Query audit ====================

    /// Append one query audit row; the log is append-only and retained
    /// indefinitely.
    pub fn append_query_audit(&self, audit: &QueryAudit) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO search_queries (query, kind, round, result_count, success, error, executed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    audit.query,
                    audit.kind.as_str(),
                    audit.round,
                    audit.result_count,
                    audit.success as i32,
                    audit.error,
                    audit.executed_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn query_audit_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM search_queries", [], |row| row.get(0))
        })
    }

    /// Query texts already recorded for a round, used for round-2 query
    /// dedup.
    pub fn queries_for_round(&self, round: u8) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT query FROM search_queries WHERE round = ?1")?;
            let rows = stmt.query_map(params![round], |row| row.get(0))?;
            rows.collect()
        })
    }

    // ==================== Cycles ====================

    /// Persist the per-cycle stats record.
    pub fn record_cycle(&self, record: &CycleRecord) -> Result<()> {
        let errors = serde_json::to_string(&record.errors)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cycles (
                    started_at, finished_at, round1_articles, round2_articles,
                    round1_events, round2_events, groups, alerts, coverage_boost, errors
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.started_at.to_rfc3339(),
                    record.finished_at.to_rfc3339(),
                    record.round1_articles,
                    record.round2_articles,
                    record.round1_events,
                    record.round2_events,
                    record.groups,
                    record.alerts,
                    record.coverage_boost,
                    errors,
                ],
            )?;
            Ok(())
        })
    }

    pub fn cycle_count(&self) -> Result<u64> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM cycles", [], |row| row.get(0)))
    }

    // ==================== Spool ====================

    /// Serialize a skipped batch to the offline spool for later replay.
    /// Spool failures are logged, never propagated.
    fn spool<T: serde::Serialize>(&self, label: &str, batch: &[T]) {
        let Some(path) = &self.spool_path else {
            tracing::error!(label, "no spool configured, dropping {} rows", batch.len());
            return;
        };
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| {
                for row in batch {
                    let line = serde_json::to_string(row).unwrap_or_else(|_| "null".into());
                    writeln!(file, "{{\"table\":\"{}\",\"row\":{}}}", label, line)?;
                }
                Ok(())
            });
        if let Err(err) = result {
            tracing::error!(label, "spool write failed: {}", err);
        }
    }
}
