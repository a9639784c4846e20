//! Prometheus metrics for core components.
//!
//! Covered:
//! - Executions (outcome, duration, attempt rounds)
//! - Anti-bot challenges and virtual queues
//! - Session pool churn
//! - Tickets found per platform

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Executions
// =============================================================================

/// Platform executions by outcome.
pub static EXECUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticketscout_executions_total", "Platform executions by outcome"),
        &["platform", "outcome"],
    )
    .unwrap()
});

/// Duration of one platform execution.
pub static EXECUTION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ticketscout_execution_duration_seconds",
            "Duration of one platform execution",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["platform"],
    )
    .unwrap()
});

/// Attempt rounds started.
pub static ATTEMPT_ROUNDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticketscout_attempt_rounds_total", "Attempt rounds started"),
        &["platform"],
    )
    .unwrap()
});

/// Individual session failures by kind.
pub static SESSION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticketscout_session_failures_total",
            "Failed session requests by kind",
        ),
        &["platform", "kind"], // "transport", "timeout", "blocked", "challenge", "parse"
    )
    .unwrap()
});

// =============================================================================
// Anti-bot and queues
// =============================================================================

pub static CHALLENGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticketscout_challenges_total",
            "Anti-bot challenges detected by provider",
        ),
        &["platform", "provider"],
    )
    .unwrap()
});

pub static QUEUE_DETECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticketscout_queue_detections_total",
            "Virtual queues detected",
        ),
        &["platform"],
    )
    .unwrap()
});

// =============================================================================
// Sessions
// =============================================================================

pub static SESSIONS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticketscout_sessions_created_total", "Sessions created"),
        &["platform", "prewarmed"],
    )
    .unwrap()
});

pub static SESSIONS_ROTATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticketscout_sessions_rotated_total", "Sessions rotated"),
        &["platform"],
    )
    .unwrap()
});

// =============================================================================
// Results
// =============================================================================

pub static TICKETS_FOUND: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticketscout_tickets_found_total",
            "Tickets accepted after filtering",
        ),
        &["platform"],
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Executions
        Box::new(EXECUTIONS.clone()),
        Box::new(EXECUTION_DURATION.clone()),
        Box::new(ATTEMPT_ROUNDS.clone()),
        Box::new(SESSION_FAILURES.clone()),
        // Anti-bot and queues
        Box::new(CHALLENGES.clone()),
        Box::new(QUEUE_DETECTIONS.clone()),
        // Sessions
        Box::new(SESSIONS_CREATED.clone()),
        Box::new(SESSIONS_ROTATED.clone()),
        // Results
        Box::new(TICKETS_FOUND.clone()),
    ]
}
