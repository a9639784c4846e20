//! Combining platform executions into one ranked result set.

mod types;

pub use types::*;

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;

use crate::executor::{ExecutionOutcome, PlatformExecution};
use crate::listing::{Availability, ScrapedTicket};

/// Keep the first ticket seen for each `(title, date)`.
pub fn deduplicate(tickets: Vec<ScrapedTicket>) -> Vec<ScrapedTicket> {
    let mut seen = HashSet::new();
    tickets
        .into_iter()
        .filter(|t| seen.insert(t.dedup_key()))
        .collect()
}

/// Available tickets first, then by demand tier, most contested first.
/// The sort is stable, so equal tickets keep their relative order.
pub fn prioritize(tickets: &mut [ScrapedTicket]) {
    tickets.sort_by_key(|t| (t.availability != Availability::Available, t.demand_level.rank()));
}

/// Merge executions in the order given.
pub fn merge(executions: Vec<PlatformExecution>) -> ResultSet {
    let mut platform_stats = BTreeMap::new();
    let mut tickets = Vec::new();
    let mut cancelled = false;

    for execution in executions {
        cancelled |= execution.outcome == ExecutionOutcome::Cancelled;
        platform_stats.insert(execution.platform.clone(), PlatformStats::from(&execution));
        tickets.extend(execution.tickets);
    }

    let total = tickets.len();
    let mut tickets = deduplicate(tickets);
    prioritize(&mut tickets);

    tracing::debug!(
        total,
        unique = tickets.len(),
        platforms = platform_stats.len(),
        "Merged platform results"
    );

    ResultSet {
        tickets,
        platform_stats,
        aggregated_at: Utc::now(),
        cancelled,
    }
}
