use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::demand::StrategyName;
use crate::executor::{ExecutionOutcome, PlatformExecution, SessionFailure};
use crate::listing::ScrapedTicket;
use crate::queue::QueuePhase;

/// Per-platform diagnostics attached to a [`ResultSet`].
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    /// Tickets the platform produced before deduplication.
    pub found: usize,
    pub errors: usize,
    pub outcome: ExecutionOutcome,
    pub strategy: StrategyName,
    pub attempts: u32,
    pub backoff_ms: Vec<u64>,
    pub queue_phases: Vec<QueuePhase>,
    pub session_errors: Vec<SessionFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
    pub duration_ms: u64,
}

impl From<&PlatformExecution> for PlatformStats {
    fn from(execution: &PlatformExecution) -> Self {
        Self {
            found: execution.tickets.len(),
            errors: execution.session_errors.len(),
            outcome: execution.outcome,
            strategy: execution.strategy,
            attempts: execution.attempts,
            backoff_ms: execution.backoff_schedule.clone(),
            queue_phases: execution.queue_phases.clone(),
            session_errors: execution.session_errors.clone(),
            cooldown_remaining_secs: execution.cooldown_remaining_secs,
            duration_ms: execution.duration_ms,
        }
    }
}

/// Deduplicated, ranked tickets from every platform.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    pub tickets: Vec<ScrapedTicket>,
    pub platform_stats: BTreeMap<String, PlatformStats>,
    pub aggregated_at: DateTime<Utc>,
    /// Set when any platform stopped because the run was cancelled.
    pub cancelled: bool,
}

impl ResultSet {
    pub fn empty() -> Self {
        Self {
            tickets: Vec::new(),
            platform_stats: BTreeMap::new(),
            aggregated_at: Utc::now(),
            cancelled: false,
        }
    }

    /// Tickets found across platforms before deduplication.
    pub fn total_found(&self) -> usize {
        self.platform_stats.values().map(|s| s.found).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.platform_stats.values().map(|s| s.errors).sum()
    }
}
