use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::PlatformConfig;
use crate::demand::{DemandProfile, StrategyName, StrategyProfile};
use crate::listing::{ScrapeCriteria, ScrapedTicket};
use crate::parser::DocumentParser;
use crate::queue::QueuePhase;

/// How one platform's execution ended.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Tickets were found.
    Completed,
    /// Every attempt ran without finding tickets.
    Exhausted,
    /// Waited in a virtual queue until the ceiling.
    QueueExpired,
    /// Hit a second queue after resuming from the first.
    QueueReentered,
    /// Skipped because the platform's cooldown marker is set.
    CoolingDown,
    Cancelled,
    /// Shared state was unavailable.
    Failed,
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionOutcome::Completed => "completed",
            ExecutionOutcome::Exhausted => "exhausted",
            ExecutionOutcome::QueueExpired => "queue_expired",
            ExecutionOutcome::QueueReentered => "queue_reentered",
            ExecutionOutcome::CoolingDown => "cooling_down",
            ExecutionOutcome::Cancelled => "cancelled",
            ExecutionOutcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one session's request produced nothing.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    Transport { message: String },
    Timeout,
    /// HTTP 403 or 429.
    Blocked { status: u16 },
    /// Anti-bot challenge; distinct from the platform being offline.
    Challenge { provider: String },
    Parse { message: String },
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Transport { .. } => "transport",
            FailureKind::Timeout => "timeout",
            FailureKind::Blocked { .. } => "blocked",
            FailureKind::Challenge { .. } => "challenge",
            FailureKind::Parse { .. } => "parse",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionFailure {
    pub session_id: String,
    pub attempt: u32,
    #[serde(flatten)]
    pub kind: FailureKind,
}

/// Everything one platform execution produced.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformExecution {
    pub platform: String,
    pub strategy: StrategyName,
    pub outcome: ExecutionOutcome,
    pub tickets: Vec<ScrapedTicket>,
    /// Attempt rounds started.
    pub attempts: u32,
    /// Sleeps between rounds, in milliseconds.
    pub backoff_schedule: Vec<u64>,
    pub session_errors: Vec<SessionFailure>,
    pub queue_phases: Vec<QueuePhase>,
    pub sessions_used: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
    pub duration_ms: u64,
}

impl PlatformExecution {
    pub fn new(platform: impl Into<String>, strategy: StrategyName) -> Self {
        Self {
            platform: platform.into(),
            strategy,
            outcome: ExecutionOutcome::Exhausted,
            tickets: Vec::new(),
            attempts: 0,
            backoff_schedule: Vec::new(),
            session_errors: Vec::new(),
            queue_phases: Vec::new(),
            sessions_used: 0,
            cooldown_remaining_secs: None,
            duration_ms: 0,
        }
    }

    /// A platform skipped because of an active cooldown marker.
    pub fn cooling_down(platform: impl Into<String>, strategy: StrategyName, remaining: Duration) -> Self {
        Self {
            outcome: ExecutionOutcome::CoolingDown,
            cooldown_remaining_secs: Some(remaining.as_secs()),
            ..Self::new(platform, strategy)
        }
    }
}

/// Inputs to one platform execution.
pub struct ExecutionContext<'a> {
    pub platform: &'a PlatformConfig,
    pub criteria: &'a ScrapeCriteria,
    pub profile: &'a DemandProfile,
    pub strategy: &'a StrategyProfile,
    pub parser: &'a dyn DocumentParser,
    /// Per-request timeout applied to every fetch.
    pub request_timeout: Duration,
    pub cancel: &'a CancellationToken,
}
