use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::delay::DelayConfig;
use crate::demand::{DemandConfig, StrategyName, StrategyTable};
use crate::executor::ChallengeConfig;
use crate::fetch::HttpConfig;
use crate::fingerprint::{BrowserArchetype, FingerprintConfig};
use crate::orchestrator::OrchestratorConfig;
use crate::queue::QueueConfig;
use crate::session::SessionPoolConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    #[serde(default)]
    pub delays: DelayConfig,
    #[serde(default)]
    pub sessions: SessionPoolConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub challenges: ChallengeConfig,
    #[serde(default)]
    pub strategies: StrategyTable,
    #[serde(default)]
    pub demand: DemandConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default = "default_platforms")]
    pub platforms: Vec<PlatformConfig>,
    #[serde(default)]
    pub watches: Vec<WatchConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            http: HttpConfig::default(),
            fingerprint: FingerprintConfig::default(),
            delays: DelayConfig::default(),
            sessions: SessionPoolConfig::default(),
            queue: QueueConfig::default(),
            challenges: ChallengeConfig::default(),
            strategies: StrategyTable::default(),
            demand: DemandConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            platforms: default_platforms(),
            watches: Vec::new(),
        }
    }
}

impl Config {
    pub fn platform(&self, id: &str) -> Option<&PlatformConfig> {
        self.platforms.iter().find(|p| p.id == id)
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Persistence sink configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Disable to run without a sink.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_db_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_db_path() -> PathBuf {
    PathBuf::from("ticketscout.db")
}

/// One ticket-selling platform.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PlatformConfig {
    pub id: String,
    pub base_url: String,
    /// Path of the search/listing page, relative to `base_url`.
    #[serde(default = "default_tickets_path")]
    pub search_path: String,
    /// Path fetched while pre-warming a session.
    #[serde(default = "default_tickets_path")]
    pub tickets_path: String,
    /// Scales every pacing delay; stricter sites get more than 1.0.
    #[serde(default = "default_delay_multiplier")]
    pub delay_multiplier: f64,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Used when the demand profile names no strategy.
    #[serde(default)]
    pub default_strategy: Option<StrategyName>,
    /// Archetype weights; `[fingerprint].default_weights` when unset.
    #[serde(default)]
    pub browser_weights: Option<BTreeMap<BrowserArchetype, f64>>,
}

fn default_tickets_path() -> String {
    "/tickets".to_string()
}

fn default_delay_multiplier() -> f64 {
    1.0
}

fn default_requests_per_minute() -> u32 {
    30
}

impl PlatformConfig {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            search_path: default_tickets_path(),
            tickets_path: default_tickets_path(),
            delay_multiplier: default_delay_multiplier(),
            requests_per_minute: default_requests_per_minute(),
            default_strategy: None,
            browser_weights: None,
        }
    }

    pub fn home_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    pub fn tickets_url(&self) -> String {
        format!("{}{}", self.home_url(), self.tickets_path)
    }

    /// Search URL for a keyword and optional start date.
    pub fn search_url(&self, keyword: &str, date_from: Option<chrono::NaiveDate>) -> String {
        let keyword = urlencoding::encode(keyword);
        let mut url = format!(
            "{}{}?q={}&search={}",
            self.home_url(),
            self.search_path,
            keyword,
            keyword
        );
        if let Some(from) = date_from {
            url.push_str(&format!("&from={}", from.format("%Y-%m-%d")));
        }
        url.push_str("&availability=available&sort=date_asc");
        url
    }
}

fn club(
    id: &str,
    base_url: &str,
    path: &str,
    delay_multiplier: f64,
    strategy: StrategyName,
    weights: [f64; 4],
) -> PlatformConfig {
    PlatformConfig {
        search_path: path.to_string(),
        tickets_path: path.to_string(),
        delay_multiplier,
        default_strategy: Some(strategy),
        browser_weights: Some(
            BrowserArchetype::ALL
                .iter()
                .copied()
                .zip(weights)
                .collect(),
        ),
        ..PlatformConfig::new(id, base_url)
    }
}

/// The built-in club platforms.
pub fn default_platforms() -> Vec<PlatformConfig> {
    use StrategyName::*;
    vec![
        club("real_madrid", "https://www.realmadrid.com", "/entradas", 1.3, Aggressive, [0.4, 0.2, 0.3, 0.1]),
        club("barcelona", "https://www.fcbarcelona.com", "/es/entradas", 1.3, Aggressive, [0.45, 0.15, 0.35, 0.05]),
        club("bayern_munich", "https://fcbayern.com", "/de/tickets", 1.2, Moderate, [0.5, 0.2, 0.25, 0.05]),
        club("manchester_city", "https://www.mancity.com", "/tickets", 1.4, Aggressive, [0.35, 0.3, 0.2, 0.15]),
        club("psg", "https://www.psg.fr", "/billetterie", 1.2, Moderate, [0.4, 0.25, 0.25, 0.1]),
        club("juventus", "https://www.juventus.com", "/it/biglietti", 1.1, Moderate, [0.4, 0.2, 0.3, 0.1]),
    ]
}

/// A recurring watch started at boot.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WatchConfig {
    pub keyword: String,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub max_price: Option<f64>,
    /// Defaults to the matched demand profile's monitoring interval.
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

impl WatchConfig {
    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(|s| Duration::from_secs(s.max(1)))
    }
}
