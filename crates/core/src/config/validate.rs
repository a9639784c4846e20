use std::collections::HashSet;

use tracing::warn;

use super::{types::Config, ConfigError};
use crate::executor::compile_pattern;

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration
///
/// Rejects settings that would make an orchestration run meaningless:
/// - Server port 0
/// - Empty or duplicate platform ids
/// - Strategies with zero concurrency, retries or rotation frequency, or a
///   backoff multiplier below 1.0
/// - Delay patterns with `min_ms > max_ms`
/// - Browser weights that are all zero or negative
/// - Challenge patterns that do not compile
/// - Zero queue ceilings
/// - Watches naming an unknown platform
///
/// Demand profiles naming an unconfigured platform only log a warning.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    validate_platforms(config)?;
    validate_strategies(config)?;

    for (action, pattern) in config.delays.patterns() {
        if pattern.min_ms > pattern.max_ms {
            return Err(invalid(format!(
                "delays.{}: min_ms {} exceeds max_ms {}",
                action.as_str(),
                pattern.min_ms,
                pattern.max_ms
            )));
        }
    }

    if !has_positive_weight(config.fingerprint.default_weights.values()) {
        return Err(invalid(
            "fingerprint.default_weights must contain a positive weight",
        ));
    }

    for provider in &config.challenges.providers {
        compile_pattern(&provider.pattern).map_err(|e| {
            invalid(format!(
                "challenges: pattern for '{}' does not compile: {}",
                provider.name, e
            ))
        })?;
    }

    let queue = &config.queue;
    if queue.marker_ttl_secs == 0 || queue.max_wait_secs == 0 || queue.near_front_threshold == 0 {
        return Err(invalid(
            "queue.marker_ttl_secs, queue.max_wait_secs and queue.near_front_threshold must be positive",
        ));
    }

    for watch in &config.watches {
        if watch.keyword.trim().is_empty() {
            return Err(invalid("watches: keyword cannot be empty"));
        }
        if let Some(unknown) = watch.platforms.iter().find(|p| config.platform(p).is_none()) {
            return Err(invalid(format!(
                "watch '{}' references unknown platform '{}'",
                watch.keyword, unknown
            )));
        }
    }

    for profile in &config.demand.profiles {
        for platform in profile.platforms.iter().filter(|p| config.platform(p).is_none()) {
            warn!(
                profile = %profile.id,
                platform = %platform,
                "Demand profile references an unconfigured platform; it will be skipped"
            );
        }
    }

    Ok(())
}

fn validate_platforms(config: &Config) -> Result<(), ConfigError> {
    if config.platforms.is_empty() {
        return Err(invalid("at least one platform must be configured"));
    }

    let mut seen = HashSet::new();
    for platform in &config.platforms {
        if platform.id.trim().is_empty() {
            return Err(invalid("platform id cannot be empty"));
        }
        if !seen.insert(platform.id.as_str()) {
            return Err(invalid(format!("duplicate platform id '{}'", platform.id)));
        }
        if platform.requests_per_minute == 0 {
            return Err(invalid(format!(
                "platform '{}': requests_per_minute cannot be 0",
                platform.id
            )));
        }
        if let Some(weights) = &platform.browser_weights {
            if !has_positive_weight(weights.values()) {
                return Err(invalid(format!(
                    "platform '{}': browser_weights must contain a positive weight",
                    platform.id
                )));
            }
        }
    }
    Ok(())
}

fn validate_strategies(config: &Config) -> Result<(), ConfigError> {
    for strategy in config.strategies.iter() {
        let name = strategy.name;
        if strategy.concurrency == 0 {
            return Err(invalid(format!("strategies.{name}: concurrency cannot be 0")));
        }
        if strategy.max_retries == 0 {
            return Err(invalid(format!("strategies.{name}: max_retries cannot be 0")));
        }
        if strategy.rotation_frequency == 0 {
            return Err(invalid(format!(
                "strategies.{name}: rotation_frequency cannot be 0"
            )));
        }
        if !strategy.backoff_multiplier.is_finite() || strategy.backoff_multiplier < 1.0 {
            return Err(invalid(format!(
                "strategies.{name}: backoff_multiplier must be at least 1.0"
            )));
        }
    }
    Ok(())
}

fn has_positive_weight<'a>(mut weights: impl Iterator<Item = &'a f64>) -> bool {
    weights.any(|w| w.is_finite() && *w > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config_from_str, PlatformConfig, WatchConfig};
    use crate::executor::ChallengeProvider;

    fn message(config: &Config) -> String {
        match validate_config(config) {
            Err(ConfigError::ValidationError(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_defaults() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(message(&config).contains("server.port"));
    }

    #[test]
    fn test_validate_platform_set() {
        let mut config = Config::default();
        config
            .platforms
            .push(PlatformConfig::new("psg", "https://elsewhere.test"));
        assert!(message(&config).contains("duplicate platform id 'psg'"));

        config.platforms.clear();
        assert!(message(&config).contains("at least one platform"));
    }

    #[test]
    fn test_validate_strategy_bounds() {
        let mut config = Config::default();
        config.strategies.moderate.backoff_multiplier = 0.5;
        assert!(message(&config).contains("strategies.moderate"));

        let mut config = Config::default();
        config.strategies.aggressive.concurrency = 0;
        assert!(message(&config).contains("concurrency"));

        let mut config = Config::default();
        config.strategies.conservative.rotation_frequency = 0;
        assert!(message(&config).contains("rotation_frequency"));
    }

    #[test]
    fn test_validate_delay_range() {
        let mut config = Config::default();
        config.delays.search.min_ms = 9000;
        assert!(message(&config).contains("delays.search"));
    }

    #[test]
    fn test_validate_weights_and_patterns() {
        let toml = r#"
[[platforms]]
id = "club_a"
base_url = "https://club-a.test"

[platforms.browser_weights]
chrome_windows = 0.0
safari_mac = -1.0
"#;
        let config = load_config_from_str(toml).unwrap();
        assert!(message(&config).contains("browser_weights"));

        let mut config = Config::default();
        config.challenges.providers.push(ChallengeProvider {
            name: "broken".into(),
            pattern: "(unclosed".into(),
            cooldown_secs: 10,
        });
        assert!(message(&config).contains("'broken'"));
    }

    #[test]
    fn test_validate_watches_and_queue() {
        let mut config = Config::default();
        config.watches.push(WatchConfig {
            keyword: "Der Klassiker".into(),
            platforms: vec!["borussia_dortmund".into()],
            max_price: None,
            interval_secs: None,
        });
        assert!(message(&config).contains("unknown platform 'borussia_dortmund'"));

        let mut config = Config::default();
        config.queue.max_wait_secs = 0;
        assert!(message(&config).contains("queue"));
    }

    #[test]
    fn test_unconfigured_profile_platform_is_only_a_warning() {
        // der_klassiker names borussia_dortmund, which is not a default platform
        let config = Config::default();
        assert!(config
            .demand
            .profiles
            .iter()
            .any(|p| p.platforms.iter().any(|id| config.platform(id).is_none())));
        assert!(validate_config(&config).is_ok());
    }
}
