// src/store.rs
//! Deduplicating event store.
//!
//! `link_original` is the natural key. The SQLite table carries a `UNIQUE`
//! constraint on it and every write is a single
//! `INSERT … ON CONFLICT(link_original) DO NOTHING`, so two pipelines racing
//! on the same database can never produce duplicate rows. Stored rows are
//! never updated by a later scrape of the same link.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::event::{Analysis, Event, SourceType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("creating store directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("event has no link_original")]
    MissingLink,
}

/// Write seam of the store. `Ok(true)` = newly inserted, `Ok(false)` = a row
/// with the same link already existed and was left untouched.
pub trait EventSink {
    fn insert_if_absent(&self, event: &Event) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Events that never reached the sink (empty link).
    pub rejected: usize,
}

/// Insert every storable event that is not stored yet. Per-event failures are
/// logged and skipped; the batch always runs to the end.
pub fn upsert_batch<S: EventSink + ?Sized>(sink: &S, events: &[Event]) -> BatchOutcome {
    let mut out = BatchOutcome::default();
    for ev in events {
        if !ev.is_storable() {
            tracing::warn!(target: "store", event_id = %ev.event_id, "event without link never stored");
            out.rejected += 1;
            continue;
        }
        match sink.insert_if_absent(ev) {
            Ok(true) => out.inserted += 1,
            Ok(false) => out.duplicates += 1,
            Err(e) => {
                tracing::warn!(target: "store", link = %ev.link_original, error = %e, "error storing event");
                out.failed += 1;
            }
        }
    }
    out
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS events(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    link_original TEXT NOT NULL UNIQUE,
    event_id TEXT NOT NULL,
    source_type TEXT NOT NULL,
    source_name TEXT NOT NULL,
    content_raw TEXT NOT NULL,
    content_summary TEXT NOT NULL,
    timestamp_published TEXT NOT NULL,
    timestamp_scraped TEXT NOT NULL,
    media_urls TEXT NOT NULL,
    categories TEXT NOT NULL,
    mentioned_locations TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_published ON events(timestamp_published);";

const SELECT_COLUMNS: &str = "event_id, source_type, source_name, content_raw, content_summary,
    link_original, timestamp_published, timestamp_scraped, media_urls, categories,
    mentioned_locations";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        // Concurrent runs wait for the writer lock instead of failing.
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(SCHEMA)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }

    pub fn get_by_link(&self, link: &str) -> Result<Option<Event>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM events WHERE link_original = ?1");
        let ev = self
            .conn
            .query_row(&sql, params![link], row_to_event)
            .optional()?;
        Ok(ev)
    }

    /// Newest events first, optionally only those tagged with `category`.
    pub fn recent(&self, limit: usize, category: Option<&str>) -> Result<Vec<Event>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut out = Vec::new();
        match category {
            Some(cat) => {
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM events
                     WHERE EXISTS (SELECT 1 FROM json_each(events.categories) WHERE json_each.value = ?1)
                     ORDER BY timestamp_published DESC, id DESC LIMIT ?2"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![cat, limit], row_to_event)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM events
                     ORDER BY timestamp_published DESC, id DESC LIMIT ?1"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![limit], row_to_event)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }
}

impl EventSink for SqliteStore {
    fn insert_if_absent(&self, event: &Event) -> Result<bool, StoreError> {
        if !event.is_storable() {
            return Err(StoreError::MissingLink);
        }
        let media = serde_json::to_string(&event.media_urls)?;
        let categories = serde_json::to_string(&event.analysis.categories)?;
        let locations = serde_json::to_string(&event.analysis.mentioned_locations)?;
        let changed = self.conn.execute(
            "INSERT INTO events (link_original, event_id, source_type, source_name,
                content_raw, content_summary, timestamp_published, timestamp_scraped,
                media_urls, categories, mentioned_locations)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(link_original) DO NOTHING",
            params![
                event.link_original,
                event.event_id,
                event.source_type.as_str(),
                event.source_name,
                event.content_raw,
                event.content_summary,
                event.timestamp_published,
                event.timestamp_scraped,
                media,
                categories,
                locations,
            ],
        )?;
        Ok(changed == 1)
    }
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let source_type: String = row.get(1)?;
    let source_type = source_type.parse::<SourceType>().map_err(|msg| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            msg.into(),
        )
    })?;
    let timestamp_published: DateTime<Utc> = row.get(6)?;
    let timestamp_scraped: DateTime<Utc> = row.get(7)?;
    Ok(Event {
        event_id: row.get(0)?,
        source_type,
        source_name: row.get(2)?,
        content_raw: row.get(3)?,
        content_summary: row.get(4)?,
        link_original: row.get(5)?,
        timestamp_published,
        timestamp_scraped,
        media_urls: json_column(row, 8)?,
        analysis: Analysis {
            categories: json_column(row, 9)?,
            mentioned_locations: json_column(row, 10)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;

    fn ev(link: &str, published: i64) -> Event {
        let ts = DateTime::from_timestamp(published, 0).unwrap();
        Event {
            event_id: format!("rss_{link}"),
            source_type: SourceType::Rss,
            source_name: "TheHindu".into(),
            content_raw: "Pothole on MG Road. Commuters complain".into(),
            content_summary: "Commuters complain".into(),
            link_original: link.into(),
            timestamp_published: ts,
            timestamp_scraped: ts,
            media_urls: vec!["https://img.example/1.jpg".into()],
            analysis: Classifier::default().classify("Pothole on MG Road"),
        }
    }

    #[test]
    fn row_round_trip_preserves_event() {
        let store = SqliteStore::open_in_memory().unwrap();
        let e = ev("https://x.example/1", 1_700_000_000);
        assert!(store.insert_if_absent(&e).unwrap());
        let back = store.get_by_link(&e.link_original).unwrap().unwrap();
        assert_eq!(back, e);
        assert!(store.get_by_link("https://x.example/nope").unwrap().is_none());
    }

    #[test]
    fn second_insert_keeps_first_content() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = ev("https://x.example/1", 1_700_000_000);
        let mut later = first.clone();
        later.content_summary = "edited later".into();
        assert!(store.insert_if_absent(&first).unwrap());
        assert!(!store.insert_if_absent(&later).unwrap());
        let stored = store.get_by_link(&first.link_original).unwrap().unwrap();
        assert_eq!(stored.content_summary, "Commuters complain");
    }

    #[test]
    fn unique_constraint_lives_in_the_schema() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_if_absent(&ev("https://x.example/1", 1)).unwrap();
        // Bypassing the conflict clause must hit the constraint.
        let err = store.conn.execute(
            "INSERT INTO events (link_original, event_id, source_type, source_name,
                content_raw, content_summary, timestamp_published, timestamp_scraped,
                media_urls, categories, mentioned_locations)
             SELECT link_original, event_id, source_type, source_name, content_raw,
                content_summary, timestamp_published, timestamp_scraped, media_urls,
                categories, mentioned_locations FROM events",
            [],
        );
        assert!(err.is_err());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn recent_orders_and_filters_by_category() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut old = ev("https://x.example/old", 1_000);
        old.analysis = Classifier::default().classify("Concert at Hebbal");
        let new = ev("https://x.example/new", 2_000);
        store.insert_if_absent(&old).unwrap();
        store.insert_if_absent(&new).unwrap();

        let all = store.recent(10, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].link_original, "https://x.example/new");

        let cultural = store.recent(10, Some("cultural_event")).unwrap();
        assert_eq!(cultural.len(), 1);
        assert_eq!(cultural[0].link_original, "https://x.example/old");

        assert_eq!(store.recent(1, None).unwrap().len(), 1);
    }

    #[test]
    fn sink_refuses_empty_link() {
        let store = SqliteStore::open_in_memory().unwrap();
        let e = ev("  ", 1);
        assert!(matches!(
            store.insert_if_absent(&e),
            Err(StoreError::MissingLink)
        ));
    }
}
