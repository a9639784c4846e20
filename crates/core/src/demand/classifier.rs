//! Maps search criteria to a demand profile and a strategy.

use std::collections::HashMap;

use tracing::debug;

use super::{DemandConfig, DemandLevel, DemandProfile, StrategyName, StrategyProfile, StrategyTable};
use crate::config::PlatformConfig;
use crate::listing::ScrapeCriteria;

/// Id of the profile used when only a generic indicator word matches.
pub const GENERIC_PROFILE_ID: &str = "high_demand_general";
/// Id of the profile used when nothing matches.
pub const STANDARD_PROFILE_ID: &str = "standard";

/// Static classifier built once from configuration.
#[derive(Debug, Clone)]
pub struct DemandClassifier {
    profiles: Vec<DemandProfile>,
    indicators: Vec<String>,
    generic: DemandProfile,
    standard: DemandProfile,
    strategies: StrategyTable,
    platform_defaults: HashMap<String, StrategyName>,
}

impl DemandClassifier {
    pub fn new(demand: &DemandConfig, strategies: &StrategyTable, platforms: &[PlatformConfig]) -> Self {
        let platform_defaults = platforms
            .iter()
            .filter_map(|p| p.default_strategy.map(|s| (p.id.clone(), s)))
            .collect();

        Self {
            profiles: demand.profiles.clone(),
            indicators: demand
                .high_demand_indicators
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
            generic: DemandProfile {
                id: GENERIC_PROFILE_ID.to_string(),
                keywords: demand.high_demand_indicators.clone(),
                platforms: Vec::new(),
                strategy: None,
                monitoring_interval_secs: demand.generic_monitoring_interval_secs,
                pre_sale_monitoring: false,
                demand_level: DemandLevel::High,
            },
            standard: DemandProfile {
                id: STANDARD_PROFILE_ID.to_string(),
                keywords: Vec::new(),
                platforms: Vec::new(),
                strategy: None,
                monitoring_interval_secs: demand.standard_monitoring_interval_secs,
                pre_sale_monitoring: false,
                demand_level: DemandLevel::Standard,
            },
            strategies: strategies.clone(),
            platform_defaults,
        }
    }

    /// First profile whose keyword occurs in the criteria keyword wins.
    pub fn classify(&self, criteria: &ScrapeCriteria) -> &DemandProfile {
        let keyword = criteria.keyword.to_lowercase();

        let matched = self.profiles.iter().find(|profile| {
            profile
                .keywords
                .iter()
                .any(|k| !k.is_empty() && keyword.contains(&k.to_lowercase()))
        });

        let profile = match matched {
            Some(profile) => profile,
            None if self.indicators.iter().any(|w| keyword.contains(w.as_str())) => &self.generic,
            None => &self.standard,
        };

        debug!(
            keyword = %criteria.keyword,
            profile = %profile.id,
            level = %profile.demand_level,
            "Classified scrape criteria"
        );
        profile
    }

    /// Profile strategy, then the platform's default, then conservative.
    pub fn select_strategy(&self, profile: &DemandProfile, platform: &str) -> StrategyProfile {
        let name = profile
            .strategy
            .or_else(|| self.platform_defaults.get(platform).copied())
            .unwrap_or(StrategyName::Conservative);
        self.strategies.get(name)
    }

    pub fn profiles(&self) -> &[DemandProfile] {
        &self.profiles
    }
}
