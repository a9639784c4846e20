//! Best-effort persistence of scraped tickets.

mod sqlite;

pub use sqlite::SqliteTicketSink;

use thiserror::Error;

use crate::listing::ScrapedTicket;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(String),
}

/// Where scraped tickets end up.
///
/// Calls are blocking; the orchestrator runs them on the blocking pool and
/// only logs failures.
pub trait TicketSink: Send + Sync {
    fn save(&self, ticket: &ScrapedTicket) -> Result<(), SinkError>;

    /// Save a batch, returning how many were written.
    fn save_all(&self, tickets: &[ScrapedTicket]) -> Result<usize, SinkError> {
        for ticket in tickets {
            self.save(ticket)?;
        }
        Ok(tickets.len())
    }
}
