//! SQLite-backed ticket sink.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::{SinkError, TicketSink};
use crate::listing::ScrapedTicket;

const UPSERT: &str = r#"
    INSERT INTO scraped_tickets (
        platform, title, event_date, venue, min_price, max_price, currency,
        availability, demand_level, session_id, url, first_seen_at, last_seen_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
    ON CONFLICT(platform, title, event_date) DO UPDATE SET
        venue = excluded.venue,
        min_price = excluded.min_price,
        max_price = excluded.max_price,
        currency = excluded.currency,
        availability = excluded.availability,
        demand_level = excluded.demand_level,
        session_id = excluded.session_id,
        url = excluded.url,
        last_seen_at = excluded.last_seen_at,
        seen_count = seen_count + 1
"#;

/// Upserts tickets keyed by platform, title and event date.
pub struct SqliteTicketSink {
    conn: Mutex<Connection>,
}

impl SqliteTicketSink {
    /// Open (or create) the database file and its table.
    pub fn new(path: &Path) -> Result<Self, SinkError> {
        let conn = Connection::open(path).map_err(|e| SinkError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory().map_err(|e| SinkError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SinkError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scraped_tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform TEXT NOT NULL,
                title TEXT NOT NULL,
                event_date TEXT NOT NULL DEFAULT '',
                venue TEXT,
                min_price REAL,
                max_price REAL,
                currency TEXT NOT NULL,
                availability TEXT NOT NULL,
                demand_level TEXT NOT NULL,
                session_id TEXT NOT NULL,
                url TEXT,
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                seen_count INTEGER NOT NULL DEFAULT 1,
                UNIQUE(platform, title, event_date)
            );

            CREATE INDEX IF NOT EXISTS idx_scraped_tickets_last_seen ON scraped_tickets(last_seen_at);
            "#,
        )
        .map_err(|e| SinkError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SinkError> {
        self.conn
            .lock()
            .map_err(|_| SinkError::Database("connection lock poisoned".to_string()))
    }

    fn upsert(conn: &Connection, ticket: &ScrapedTicket) -> Result<(), SinkError> {
        conn.execute(
            UPSERT,
            params![
                ticket.platform,
                ticket.title,
                ticket.date.as_deref().unwrap_or_default(),
                ticket.venue,
                ticket.min_price,
                ticket.max_price,
                ticket.currency,
                ticket.availability.as_str(),
                ticket.demand_level.as_str(),
                ticket.session_id,
                ticket.url,
                ticket.scraped_at.to_rfc3339(),
            ],
        )
        .map_err(|e| SinkError::Database(e.to_string()))?;
        Ok(())
    }

    /// Number of distinct stored listings.
    pub fn count(&self) -> Result<u64, SinkError> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM scraped_tickets", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as u64)
        .map_err(|e| SinkError::Database(e.to_string()))
    }

    /// How many times a listing has been seen.
    pub fn seen_count(&self, platform: &str, title: &str, date: Option<&str>) -> Result<Option<u32>, SinkError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT seen_count FROM scraped_tickets WHERE platform = ?1 AND title = ?2 AND event_date = ?3",
            params![platform, title, date.unwrap_or_default()],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map(|count| count.map(|n| n as u32))
        .map_err(|e| SinkError::Database(e.to_string()))
    }
}

impl TicketSink for SqliteTicketSink {
    fn save(&self, ticket: &ScrapedTicket) -> Result<(), SinkError> {
        let conn = self.lock()?;
        Self::upsert(&conn, ticket)
    }

    fn save_all(&self, tickets: &[ScrapedTicket]) -> Result<usize, SinkError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| SinkError::Database(e.to_string()))?;
        for ticket in tickets {
            Self::upsert(&tx, ticket)?;
        }
        tx.commit().map_err(|e| SinkError::Database(e.to_string()))?;
        tracing::debug!(count = tickets.len(), "Persisted scraped tickets");
        Ok(tickets.len())
    }
}
