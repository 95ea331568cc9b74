//! SQLite schema and migrations for the event store.
//!
//! The stored schema is the authority: migrations run before any write
//! that references new columns, and no client-side reflection is used.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    // Enable WAL mode for better concurrent access
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // Enable foreign keys
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

/// Apply version 1 schema.
fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    // Source catalog, keyed on normalized name
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sources (
            name TEXT PRIMARY KEY,
            id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            kind TEXT NOT NULL,
            language TEXT NOT NULL DEFAULT 'en',
            regions TEXT,
            reliability REAL NOT NULL DEFAULT 50.0,
            bias REAL NOT NULL DEFAULT 0.0,
            rate_limit_per_hour INTEGER NOT NULL DEFAULT 10,
            health REAL NOT NULL DEFAULT 1.0,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            last_success TEXT,
            daily_access_count INTEGER NOT NULL DEFAULT 0,
            access_day TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    // Raw articles; the content hash is the dedup key across all runs
    conn.execute(
        "CREATE TABLE IF NOT EXISTS articles_raw (
            content_hash TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            headline TEXT NOT NULL,
            body TEXT NOT NULL,
            published TEXT NOT NULL,
            source_id TEXT NOT NULL,
            round INTEGER NOT NULL DEFAULT 1,
            query TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Structured events with a geographic point and JSON columns for
    // casualties, actors, and weapons
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            enhanced_headline TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            timestamp_confidence TEXT NOT NULL DEFAULT 'low',
            lat REAL,
            lng REAL,
            location_name TEXT,
            country TEXT,
            region TEXT,
            location_method TEXT NOT NULL DEFAULT 'unresolved',
            location_confidence REAL NOT NULL DEFAULT 0.0,
            event_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            escalation_score INTEGER NOT NULL,
            casualties TEXT NOT NULL DEFAULT '{}',
            primary_actors TEXT NOT NULL DEFAULT '[]',
            weapon_types TEXT NOT NULL DEFAULT '[]',
            article_ids TEXT NOT NULL DEFAULT '[]',
            reliability REAL NOT NULL DEFAULT 0.0,
            tags TEXT NOT NULL DEFAULT '[]',
            group_id TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Event groups; member ids keep their insertion order
    conn.execute(
        "CREATE TABLE IF NOT EXISTS event_groups (
            id TEXT PRIMARY KEY,
            member_event_ids TEXT NOT NULL,
            primary_event_id TEXT NOT NULL REFERENCES events(id),
            confidence REAL NOT NULL DEFAULT 0.0,
            corroboration_count INTEGER NOT NULL DEFAULT 0,
            source_diversity REAL NOT NULL DEFAULT 0.0,
            corroborated INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Append-only query audit
    conn.execute(
        "CREATE TABLE IF NOT EXISTS search_queries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query TEXT NOT NULL,
            kind TEXT NOT NULL,
            round INTEGER NOT NULL,
            result_count INTEGER NOT NULL DEFAULT 0,
            success INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            executed_at TEXT NOT NULL
        )",
        [],
    )?;

    // Per-cycle stats records
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cycles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            round1_articles INTEGER NOT NULL DEFAULT 0,
            round2_articles INTEGER NOT NULL DEFAULT 0,
            round1_events INTEGER NOT NULL DEFAULT 0,
            round2_events INTEGER NOT NULL DEFAULT 0,
            groups INTEGER NOT NULL DEFAULT 0,
            alerts INTEGER NOT NULL DEFAULT 0,
            coverage_boost REAL NOT NULL DEFAULT 0.0,
            errors TEXT NOT NULL DEFAULT '[]'
        )",
        [],
    )?;

    // Indexes for the read paths: spatial, temporal, severity
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_articles_url ON articles_raw(url)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_articles_created ON articles_raw(created_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_severity ON events(severity)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_escalation ON events(escalation_score)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_location ON events(lat, lng)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_groups_primary ON event_groups(primary_event_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_queries_executed ON search_queries(executed_at)",
        [],
    )?;

    // Record migration
    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    Ok(())
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Check if the schema is initialized.
pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='events'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}
