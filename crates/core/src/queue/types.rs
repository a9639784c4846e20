use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kv::StoreError;

/// Phase of one platform execution with respect to virtual queues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueuePhase {
    Idle,
    Scraping,
    QueueDetected,
    Waiting,
    BypassAttempt,
    Completed,
    Failed,
    Expired,
}

impl QueuePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueuePhase::Idle => "idle",
            QueuePhase::Scraping => "scraping",
            QueuePhase::QueueDetected => "queue_detected",
            QueuePhase::Waiting => "waiting",
            QueuePhase::BypassAttempt => "bypass_attempt",
            QueuePhase::Completed => "completed",
            QueuePhase::Failed => "failed",
            QueuePhase::Expired => "expired",
        }
    }

    /// Whether the machine may move from `self` to `next`.
    ///
    /// `Idle → Waiting` covers a caller that finds its platform already
    /// queued by someone else and never starts scraping.
    pub fn can_transition_to(&self, next: QueuePhase) -> bool {
        use QueuePhase::*;
        matches!(
            (self, next),
            (Idle, Scraping)
                | (Idle, Waiting)
                | (Scraping, QueueDetected)
                | (Scraping, Completed)
                | (Scraping, Failed)
                | (QueueDetected, Waiting)
                | (QueueDetected, BypassAttempt)
                | (Waiting, Scraping)
                | (Waiting, Expired)
                | (BypassAttempt, Scraping)
                | (BypassAttempt, Waiting)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueuePhase::Completed | QueuePhase::Failed | QueuePhase::Expired
        )
    }
}

impl std::fmt::Display for QueuePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueueError {
    #[error("Invalid queue transition from {from} to {to}")]
    InvalidTransition { from: QueuePhase, to: QueuePhase },

    #[error("Queue store error: {0}")]
    Store(#[from] StoreError),
}

/// Per-execution state machine with its transition history.
#[derive(Debug, Clone)]
pub struct QueueMachine {
    platform: String,
    phase: QueuePhase,
    history: Vec<QueuePhase>,
}

impl QueueMachine {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            phase: QueuePhase::Idle,
            history: vec![QueuePhase::Idle],
        }
    }

    pub fn phase(&self) -> QueuePhase {
        self.phase
    }

    /// Every phase entered, starting with `Idle`.
    pub fn history(&self) -> &[QueuePhase] {
        &self.history
    }

    /// Times the machine entered `QueueDetected`.
    pub fn detections(&self) -> usize {
        self.history
            .iter()
            .filter(|p| **p == QueuePhase::QueueDetected)
            .count()
    }

    pub fn transition(&mut self, next: QueuePhase) -> Result<(), QueueError> {
        if !self.phase.can_transition_to(next) {
            return Err(QueueError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(
            platform = %self.platform,
            from = %self.phase,
            to = %next,
            "Queue phase transition"
        );
        self.phase = next;
        self.history.push(next);
        Ok(())
    }
}

/// `[queue]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Case-insensitive phrases identifying a waiting-room page.
    #[serde(default = "default_signatures")]
    pub signatures: Vec<String>,
    /// Lifetime of the shared in-queue marker.
    #[serde(default = "default_marker_ttl_secs")]
    pub marker_ttl_secs: u64,
    /// Queue position at which scraping resumes.
    #[serde(default = "default_near_front_threshold")]
    pub near_front_threshold: u32,
    /// Longest a caller waits before giving up.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_signatures() -> Vec<String> {
    [
        "queue-it",
        "waiting room",
        "virtual queue",
        "queue position",
        "estimated wait time",
        "you are in line",
        "please wait",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_marker_ttl_secs() -> u64 {
    3600
}

fn default_near_front_threshold() -> u32 {
    10
}

fn default_max_wait_secs() -> u64 {
    1800
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            signatures: default_signatures(),
            marker_ttl_secs: default_marker_ttl_secs(),
            near_front_threshold: default_near_front_threshold(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl QueueConfig {
    pub fn marker_ttl(&self) -> Duration {
        Duration::from_secs(self.marker_ttl_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Shared in-queue marker stored under `queue_active:{platform}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueState {
    pub platform: String,
    pub in_queue: bool,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub estimated_wait_secs: Option<u64>,
    /// Execution that won the check-and-set and monitors the queue.
    pub owner: String,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueState {
    pub fn is_near_front(&self, threshold: u32) -> bool {
        self.position.is_some_and(|p| p <= threshold)
    }
}
