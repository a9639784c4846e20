//! Testing utilities and mock implementations.
//!
//! Mocks for every injected capability, so orchestration can be exercised
//! end to end without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use ticketscout_core::testing::{fixtures, MockFetcher, NoDelay, StaticParser};
//!
//! let fetcher = MockFetcher::new();
//! fetcher.respond("q=Real", FetchResponse::ok(fixtures::event_page(
//!     "Real Madrid vs Barcelona", "2026-04-12", 95.0, "InStock",
//! )));
//!
//! // Build a TicketScout with the mock, then assert on traffic
//! assert_eq!(fetcher.fetch_count_matching("q=Real"), 5);
//! ```

mod mock_fetcher;
mod mock_parser;
mod mock_sink;

pub use mock_fetcher::MockFetcher;
pub use mock_parser::StaticParser;
pub use mock_sink::RecordingSink;

use std::time::Duration;

use async_trait::async_trait;

use crate::delay::{ActionKind, Delayer};

/// [`Delayer`] that never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl Delayer for NoDelay {
    fn delay_for(&self, _action: ActionKind, _multiplier: f64) -> Duration {
        Duration::ZERO
    }

    fn backoff(&self, _base_ms: u64, _multiplier: f64, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::{Config, DatabaseConfig};
    use crate::demand::DemandLevel;
    use crate::listing::{Availability, CandidateTicket, ScrapedTicket};

    /// Create a candidate with a single price.
    pub fn candidate(title: &str, date: &str, price: f64, availability: Availability) -> CandidateTicket {
        CandidateTicket {
            title: title.to_string(),
            venue: Some("Stadium".to_string()),
            date: Some(date.to_string()),
            min_price: Some(price),
            max_price: Some(price),
            currency: Some("EUR".to_string()),
            availability,
            url: None,
        }
    }

    /// Create a scraped ticket attributed to a platform.
    pub fn ticket(
        platform: &str,
        title: &str,
        date: &str,
        availability: Availability,
        demand_level: DemandLevel,
    ) -> ScrapedTicket {
        ScrapedTicket::from_candidate(
            candidate(title, date, 100.0, availability),
            platform,
            "session-test",
            demand_level,
        )
    }

    /// Default configuration without persistence, seeded PRNGs and rate
    /// limits loose enough never to stall a test.
    pub fn test_config() -> Config {
        let mut config = Config {
            database: DatabaseConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        config.fingerprint.seed = Some(7);
        config.delays.seed = Some(7);
        for platform in &mut config.platforms {
            platform.requests_per_minute = 6000;
        }
        config
    }

    /// An HTML page carrying one schema.org `SportsEvent`.
    pub fn event_page(title: &str, date: &str, price: f64, availability: &str) -> String {
        format!(
            r#"<html><head><script type="application/ld+json">
{{"@context":"https://schema.org","@type":"SportsEvent","name":"{title}","startDate":"{date}",
 "location":{{"@type":"Place","name":"Stadium"}},
 "offers":{{"@type":"Offer","price":"{price:.2}","priceCurrency":"EUR","availability":"https://schema.org/{availability}"}}}}
</script></head><body><h1>{title}</h1></body></html>"#
        )
    }

    /// A waiting-room page showing a position and a wait estimate.
    pub fn queue_page(position: u32, wait_minutes: u32) -> String {
        format!(
            "<html><body><h1>You are in the virtual queue</h1>\
             <p>Your queue position: {position}</p>\
             <p>Estimated wait time: {wait_minutes} minutes</p></body></html>"
        )
    }
}
