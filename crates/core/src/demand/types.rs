use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How contested an event's tickets are. `Extreme` is the most contested.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DemandLevel {
    Extreme,
    VeryHigh,
    High,
    Medium,
    #[default]
    Standard,
}

impl DemandLevel {
    /// Sort rank: `Extreme` is 0, `Standard` is 4.
    pub fn rank(self) -> u8 {
        match self {
            DemandLevel::Extreme => 0,
            DemandLevel::VeryHigh => 1,
            DemandLevel::High => 2,
            DemandLevel::Medium => 3,
            DemandLevel::Standard => 4,
        }
    }

    /// The more contested of two levels.
    pub fn most_contested(self, other: DemandLevel) -> DemandLevel {
        if other.rank() < self.rank() {
            other
        } else {
            self
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DemandLevel::Extreme => "extreme",
            DemandLevel::VeryHigh => "very_high",
            DemandLevel::High => "high",
            DemandLevel::Medium => "medium",
            DemandLevel::Standard => "standard",
        }
    }
}

impl std::fmt::Display for DemandLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of one of the fixed strategy profiles.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    Aggressive,
    Moderate,
    #[default]
    Conservative,
}

impl StrategyName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyName::Aggressive => "aggressive",
            StrategyName::Moderate => "moderate",
            StrategyName::Conservative => "conservative",
        }
    }
}

impl std::fmt::Display for StrategyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concurrency, retry and backoff parameters for one scrape execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyProfile {
    /// Filled in by [`StrategyTable::get`]; not read from configuration.
    #[serde(skip)]
    pub name: StrategyName,
    /// Sessions used per attempt round.
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Rotate one session every this many attempt rounds.
    pub rotation_frequency: u32,
    #[serde(default)]
    pub bypass_allowed: bool,
    #[serde(default)]
    pub pre_queue_monitoring: bool,
}

impl StrategyProfile {
    pub fn aggressive() -> Self {
        Self {
            name: StrategyName::Aggressive,
            concurrency: 5,
            max_retries: 10,
            base_backoff_ms: 1000,
            backoff_multiplier: 1.2,
            rotation_frequency: 3,
            bypass_allowed: true,
            pre_queue_monitoring: true,
        }
    }

    pub fn moderate() -> Self {
        Self {
            name: StrategyName::Moderate,
            concurrency: 3,
            max_retries: 6,
            base_backoff_ms: 2000,
            backoff_multiplier: 1.5,
            rotation_frequency: 5,
            bypass_allowed: false,
            pre_queue_monitoring: true,
        }
    }

    pub fn conservative() -> Self {
        Self {
            name: StrategyName::Conservative,
            concurrency: 1,
            max_retries: 3,
            base_backoff_ms: 3000,
            backoff_multiplier: 2.0,
            rotation_frequency: 10,
            bypass_allowed: false,
            pre_queue_monitoring: false,
        }
    }

    /// Deterministic backoff for a 1-based attempt: `base * multiplier^(attempt-1)`.
    pub fn nominal_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let ms = self.base_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(ms.round() as u64)
    }
}

/// The three strategy profiles, overridable from `[strategies]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyTable {
    #[serde(default = "StrategyProfile::aggressive")]
    pub aggressive: StrategyProfile,
    #[serde(default = "StrategyProfile::moderate")]
    pub moderate: StrategyProfile,
    #[serde(default = "StrategyProfile::conservative")]
    pub conservative: StrategyProfile,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            aggressive: StrategyProfile::aggressive(),
            moderate: StrategyProfile::moderate(),
            conservative: StrategyProfile::conservative(),
        }
    }
}

impl StrategyTable {
    pub fn get(&self, name: StrategyName) -> StrategyProfile {
        let profile = match name {
            StrategyName::Aggressive => &self.aggressive,
            StrategyName::Moderate => &self.moderate,
            StrategyName::Conservative => &self.conservative,
        };
        StrategyProfile {
            name,
            ..profile.clone()
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = StrategyProfile> + '_ {
        [
            StrategyName::Aggressive,
            StrategyName::Moderate,
            StrategyName::Conservative,
        ]
        .into_iter()
        .map(|name| self.get(name))
    }
}

/// A known kind of event and how hard its tickets are to get.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemandProfile {
    pub id: String,
    /// Case-insensitive substrings matched against the criteria keyword.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub strategy: Option<StrategyName>,
    #[serde(default = "default_monitoring_interval_secs")]
    pub monitoring_interval_secs: u64,
    #[serde(default)]
    pub pre_sale_monitoring: bool,
    #[serde(default)]
    pub demand_level: DemandLevel,
}

fn default_monitoring_interval_secs() -> u64 {
    60
}

impl DemandProfile {
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_secs.max(1))
    }
}

fn profile(
    id: &str,
    platforms: &[&str],
    keywords: &[&str],
    strategy: StrategyName,
    monitoring_interval_secs: u64,
    pre_sale_monitoring: bool,
    demand_level: DemandLevel,
) -> DemandProfile {
    DemandProfile {
        id: id.to_string(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        platforms: platforms.iter().map(|s| s.to_string()).collect(),
        strategy: Some(strategy),
        monitoring_interval_secs,
        pre_sale_monitoring,
        demand_level,
    }
}

/// Built-in event profiles, in matching order.
pub fn default_profiles() -> Vec<DemandProfile> {
    const CL_CLUBS: &[&str] = &[
        "real_madrid",
        "barcelona",
        "bayern_munich",
        "manchester_city",
        "psg",
        "juventus",
    ];

    vec![
        profile(
            "el_clasico",
            &["real_madrid", "barcelona"],
            &[
                "Real Madrid vs Barcelona",
                "Barcelona vs Real Madrid",
                "El Clásico",
                "Clasico",
            ],
            StrategyName::Aggressive,
            30,
            true,
            DemandLevel::Extreme,
        ),
        profile(
            "champions_league_final",
            CL_CLUBS,
            &["Champions League Final", "UCL Final", "Final Champions"],
            StrategyName::Aggressive,
            15,
            true,
            DemandLevel::Extreme,
        ),
        profile(
            "der_klassiker",
            &["bayern_munich", "borussia_dortmund"],
            &[
                "Bayern München vs Borussia Dortmund",
                "Der Klassiker",
                "Bayern vs Dortmund",
            ],
            StrategyName::Aggressive,
            60,
            false,
            DemandLevel::VeryHigh,
        ),
        profile(
            "manchester_derby",
            &["manchester_city", "manchester_united"],
            &[
                "Manchester City vs Manchester United",
                "Manchester Derby",
                "City vs United",
            ],
            StrategyName::Aggressive,
            45,
            false,
            DemandLevel::VeryHigh,
        ),
        profile(
            "champions_league_knockout",
            CL_CLUBS,
            &["Champions League", "Round of 16", "Quarter Final", "Semi Final"],
            StrategyName::Moderate,
            120,
            false,
            DemandLevel::High,
        ),
    ]
}

/// `[demand]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemandConfig {
    #[serde(default = "default_profiles")]
    pub profiles: Vec<DemandProfile>,
    /// Words that mark an otherwise unknown event as high demand.
    #[serde(default = "default_high_demand_indicators")]
    pub high_demand_indicators: Vec<String>,
    #[serde(default = "default_generic_monitoring_interval_secs")]
    pub generic_monitoring_interval_secs: u64,
    #[serde(default = "default_standard_monitoring_interval_secs")]
    pub standard_monitoring_interval_secs: u64,
}

fn default_high_demand_indicators() -> Vec<String> {
    vec!["final".into(), "derby".into(), "champions league".into()]
}

fn default_generic_monitoring_interval_secs() -> u64 {
    120
}

fn default_standard_monitoring_interval_secs() -> u64 {
    300
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            high_demand_indicators: default_high_demand_indicators(),
            generic_monitoring_interval_secs: default_generic_monitoring_interval_secs(),
            standard_monitoring_interval_secs: default_standard_monitoring_interval_secs(),
        }
    }
}
