//! Recording ticket sink for testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::listing::ScrapedTicket;
use crate::sink::{SinkError, TicketSink};

/// Keeps every saved ticket in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    saved: Mutex<Vec<ScrapedTicket>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose saves all fail.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn saved(&self) -> Vec<ScrapedTicket> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TicketSink for RecordingSink {
    fn save(&self, ticket: &ScrapedTicket) -> Result<(), SinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::Database("recording sink set to fail".to_string()));
        }
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ticket.clone());
        Ok(())
    }
}
