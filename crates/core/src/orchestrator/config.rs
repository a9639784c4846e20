//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `[orchestrator]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Timeout of each search request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Ceiling for one whole scrape across all platforms.
    /// When reached, in-flight work is cancelled and partial results returned.
    #[serde(default = "default_overall_timeout")]
    pub overall_timeout_secs: u64,

    /// Hand found tickets to the persistence sink.
    #[serde(default = "default_persist")]
    pub persist_results: bool,

    /// How often idle sessions are evicted.
    #[serde(default = "default_eviction_interval")]
    pub session_eviction_interval_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_overall_timeout() -> u64 {
    600 // 10 minutes
}

fn default_persist() -> bool {
    true
}

fn default_eviction_interval() -> u64 {
    60
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            overall_timeout_secs: default_overall_timeout(),
            persist_results: default_persist(),
            session_eviction_interval_secs: default_eviction_interval(),
        }
    }
}

impl OrchestratorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs.max(1))
    }

    pub fn session_eviction_interval(&self) -> Duration {
        Duration::from_secs(self.session_eviction_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.overall_timeout(), Duration::from_secs(600));
        assert!(config.persist_results);
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml = r#"
            overall_timeout_secs = 120
            persist_results = false
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.overall_timeout_secs, 120);
        assert!(!config.persist_results);
        assert_eq!(config.request_timeout_secs, 30);
    }
}
