use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::models::{Category, Event, GeoPoint, RunStatus};
use crate::scraping::base;
use crate::utils;

pub struct Store {
    conn: Connection,
}

/// One `events` row: the extracted record plus bookkeeping columns.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredEvent {
    pub id: String,
    pub source: String,
    #[serde(flatten)]
    pub event: Event,
    pub min_price: Option<i64>,
    pub first_seen_utc: String,
    pub last_seen_utc: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunLogEntry {
    pub id: i64,
    pub scraper_name: String,
    pub status: RunStatus,
    pub events_count: i64,
    pub new_count: i64,
    pub updated_count: i64,
    pub error_message: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// Final numbers written when a source finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLogOutcome {
    pub status: RunStatus,
    pub events_count: usize,
    pub new_count: usize,
    pub updated_count: usize,
    pub error_message: Option<String>,
}

const EVENT_COLUMNS: &str = "id, source, title, venue_name, address, start_time, end_time,
    description, image_url, source_url, category, lat, lng, price, ticket_details, rules,
    tags, is_approved, min_price, first_seen_utc, last_seen_utc";

impl Store {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                title TEXT NOT NULL,
                venue_name TEXT NOT NULL,
                address TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT,
                description TEXT,
                image_url TEXT,
                source_url TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL,
                lat REAL,
                lng REAL,
                price TEXT,
                ticket_details TEXT NOT NULL DEFAULT '[]',
                rules TEXT NOT NULL DEFAULT '[]',
                tags TEXT NOT NULL DEFAULT '[]',
                is_approved INTEGER NOT NULL DEFAULT 0,
                min_price INTEGER,
                first_seen_utc TEXT NOT NULL,
                last_seen_utc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS events_source_start ON events(source, start_time);
            CREATE TABLE IF NOT EXISTS scraper_logs(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scraper_name TEXT NOT NULL,
                status TEXT NOT NULL,
                events_count INTEGER NOT NULL DEFAULT 0,
                new_count INTEGER NOT NULL DEFAULT 0,
                updated_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT
            );",
        )?;
        Ok(())
    }

    pub fn find_by_source_url(&self, source_url: &str) -> rusqlite::Result<Option<StoredEvent>> {
        self.conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE source_url = ?1"),
                params![source_url],
                stored_event_from_row,
            )
            .optional()
    }

    /// Inserts a new row keyed by the hash of the source URL; returns the row id.
    pub fn insert_event(
        &self,
        event: &Event,
        source: &str,
        min_price: Option<i64>,
    ) -> rusqlite::Result<String> {
        let id = base::url_id(&event.source_url);
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO events (id, source, title, venue_name, address, start_time, end_time,
                description, image_url, source_url, category, lat, lng, price, ticket_details,
                rules, tags, is_approved, min_price, first_seen_utc, last_seen_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20, ?20)",
            params![
                id,
                source,
                event.title,
                event.venue_name,
                event.address,
                event.start_time.to_rfc3339(),
                event.end_time.map(|end| end.to_rfc3339()),
                event.description,
                event.image_url,
                event.source_url,
                event.category.label(),
                event.geo.map(|geo| geo.lat),
                event.geo.map(|geo| geo.lng),
                event.price,
                to_json(&event.ticket_details)?,
                to_json(&event.rules)?,
                to_json(&event.tags)?,
                event.is_approved,
                min_price,
                now,
            ],
        )?;
        Ok(id)
    }

    /// Overwrites every extracted column of an existing row.
    ///
    /// `is_approved` and `first_seen_utc` are left as they are.
    pub fn update_event(
        &self,
        id: &str,
        event: &Event,
        source: &str,
        min_price: Option<i64>,
    ) -> rusqlite::Result<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE events SET
                source = ?2, title = ?3, venue_name = ?4, address = ?5, start_time = ?6,
                end_time = ?7, description = ?8, image_url = ?9, source_url = ?10,
                category = ?11, lat = ?12, lng = ?13, price = ?14, ticket_details = ?15,
                rules = ?16, tags = ?17, min_price = ?18, last_seen_utc = ?19
             WHERE id = ?1",
            params![
                id,
                source,
                event.title,
                event.venue_name,
                event.address,
                event.start_time.to_rfc3339(),
                event.end_time.map(|end| end.to_rfc3339()),
                event.description,
                event.image_url,
                event.source_url,
                event.category.label(),
                event.geo.map(|geo| geo.lat),
                event.geo.map(|geo| geo.lng),
                event.price,
                to_json(&event.ticket_details)?,
                to_json(&event.rules)?,
                to_json(&event.tags)?,
                min_price,
                now,
            ],
        )?;
        if changed == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows);
        }
        Ok(())
    }

    /// Events ordered by start time, optionally for one source.
    pub fn list_events(
        &self,
        source: Option<&str>,
        limit: Option<usize>,
    ) -> rusqlite::Result<Vec<StoredEvent>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE (?1 IS NULL OR source = ?1)
             ORDER BY start_time ASC, id ASC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![source, limit], stored_event_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn count_events(&self) -> rusqlite::Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
    }

    pub fn start_run_log(&self, scraper_name: &str) -> rusqlite::Result<i64> {
        self.conn.execute(
            "INSERT INTO scraper_logs (scraper_name, status, started_at) VALUES (?1, ?2, ?3)",
            params![scraper_name, RunStatus::Running.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn finish_run_log(&self, id: i64, outcome: &RunLogOutcome) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE scraper_logs SET
                status = ?2, events_count = ?3, new_count = ?4, updated_count = ?5,
                error_message = ?6, finished_at = ?7
             WHERE id = ?1",
            params![
                id,
                outcome.status.as_str(),
                outcome.events_count as i64,
                outcome.new_count as i64,
                outcome.updated_count as i64,
                outcome.error_message,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent run-log rows first.
    pub fn recent_logs(&self, limit: usize) -> rusqlite::Result<Vec<RunLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, scraper_name, status, events_count, new_count, updated_count,
                    error_message, started_at, finished_at
             FROM scraper_logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let status: String = row.get(2)?;
            Ok(RunLogEntry {
                id: row.get(0)?,
                scraper_name: row.get(1)?,
                status: RunStatus::parse(&status).ok_or_else(|| bad_text(2, &status))?,
                events_count: row.get(3)?,
                new_count: row.get(4)?,
                updated_count: row.get(5)?,
                error_message: row.get(6)?,
                started_at: row.get(7)?,
                finished_at: row.get(8)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    #[cfg(test)]
    pub(crate) fn set_approved(&self, source_url: &str, approved: bool) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE events SET is_approved = ?2 WHERE source_url = ?1",
            params![source_url, approved],
        )?;
        Ok(())
    }
}

fn stored_event_from_row(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    let category: String = row.get("category")?;
    let lat: Option<f64> = row.get("lat")?;
    let lng: Option<f64> = row.get("lng")?;
    let event = Event {
        title: row.get("title")?,
        venue_name: row.get("venue_name")?,
        address: row.get("address")?,
        start_time: parse_time(row, "start_time")?,
        end_time: match row.get::<_, Option<String>>("end_time")? {
            Some(_) => Some(parse_time(row, "end_time")?),
            None => None,
        },
        description: row.get("description")?,
        image_url: row.get("image_url")?,
        source_url: row.get("source_url")?,
        category: Category::from_label(&category).ok_or_else(|| bad_text(10, &category))?,
        geo: lat.zip(lng).and_then(|(lat, lng)| GeoPoint::new(lat, lng)),
        price: row.get("price")?,
        ticket_details: from_json(row, "ticket_details")?,
        rules: from_json(row, "rules")?,
        tags: from_json(row, "tags")?,
        is_approved: row.get("is_approved")?,
    };
    Ok(StoredEvent {
        id: row.get("id")?,
        source: row.get("source")?,
        event,
        min_price: row.get("min_price")?,
        first_seen_utc: row.get("first_seen_utc")?,
        last_seen_utc: row.get("last_seen_utc")?,
    })
}

fn parse_time(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                raw.len(),
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })
}

fn from_json<T: serde::de::DeserializeOwned>(row: &Row<'_>, column: &str) -> rusqlite::Result<T> {
    let payload: String = row.get(column)?;
    serde_json::from_str(&payload).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            payload.len(),
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })
}

fn to_json<T: Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))
}

fn bad_text(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("unexpected value {value:?}").into(),
    )
}
