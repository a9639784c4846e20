//! Types for the scrape orchestrator.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::demand::DemandLevel;
use crate::merger::ResultSet;

/// Configuration-class failures, raised before any network activity.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("no parser registered for platform: {0}")]
    MissingParser(String),

    #[error("no configured platforms for demand profile {0}")]
    NoPlatforms(String),
}

/// Outcome of one orchestrated scrape.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeReport {
    /// Demand profile the criteria matched.
    pub profile_id: String,
    pub demand_level: DemandLevel,
    pub pre_sale_monitoring: bool,
    pub monitoring_interval_secs: u64,
    #[serde(flatten)]
    pub result: ResultSet,
}

impl ScrapeReport {
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_secs.max(1))
    }
}
