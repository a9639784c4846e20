//! Top-level scrape orchestration.
//!
//! [`TicketScout`] validates a request, classifies its demand, runs every
//! platform in parallel and merges the results. [`PreSaleMonitor`] re-runs
//! scrapes for high-demand events on a schedule.

mod config;
mod monitor;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use monitor::{watch_key, PreSaleMonitor, WatchCallback, WatchInfo};
pub use runner::{TicketScout, TicketScoutBuilder};
pub use types::{OrchestratorError, ScrapeReport};
