//! Anti-bot challenge recognition.

use std::time::Duration;

use regex_lite::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// One anti-bot provider and the cooldown its challenge earns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChallengeProvider {
    pub name: String,
    /// Case-insensitive regex matched against response bodies.
    pub pattern: String,
    pub cooldown_secs: u64,
}

impl ChallengeProvider {
    pub fn new(name: &str, pattern: &str, cooldown_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            cooldown_secs,
        }
    }
}

/// `[challenges]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChallengeConfig {
    #[serde(default = "default_providers")]
    pub providers: Vec<ChallengeProvider>,
    /// Cooldown for providers without their own.
    #[serde(default = "default_cooldown_secs")]
    pub default_cooldown_secs: u64,
    /// Cooldown after a 403/429 without `Retry-After`.
    #[serde(default = "default_blocked_cooldown_secs")]
    pub blocked_cooldown_secs: u64,
}

fn default_providers() -> Vec<ChallengeProvider> {
    vec![
        ChallengeProvider::new("cloudflare", "challenge-form", 300),
        ChallengeProvider::new("imperva", r"distil_r_blocked\.html", 600),
        ChallengeProvider::new("datadome", "datadome", 180),
        ChallengeProvider::new("perimeterx", "_pxCustomerLogo", 240),
        ChallengeProvider::new("recaptcha", "recaptcha", 120),
        ChallengeProvider::new("hcaptcha", "hcaptcha", 120),
    ]
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_blocked_cooldown_secs() -> u64 {
    60
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            default_cooldown_secs: default_cooldown_secs(),
            blocked_cooldown_secs: default_blocked_cooldown_secs(),
        }
    }
}

impl ChallengeConfig {
    pub fn blocked_cooldown(&self) -> Duration {
        Duration::from_secs(self.blocked_cooldown_secs)
    }
}

pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, regex_lite::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// A recognized challenge.
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub provider: String,
    pub cooldown: Duration,
}

/// Compiled provider patterns, checked in configuration order.
#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    providers: Vec<(ChallengeProvider, Regex)>,
    default_cooldown: Duration,
}

impl ChallengeDetector {
    /// Patterns that fail to compile are skipped; validation reports them.
    pub fn new(config: &ChallengeConfig) -> Self {
        let providers = config
            .providers
            .iter()
            .filter_map(|p| match compile_pattern(&p.pattern) {
                Ok(re) => Some((p.clone(), re)),
                Err(e) => {
                    tracing::warn!(provider = %p.name, error = %e, "Skipping challenge pattern");
                    None
                }
            })
            .collect();
        Self {
            providers,
            default_cooldown: Duration::from_secs(config.default_cooldown_secs),
        }
    }

    pub fn detect(&self, body: &str) -> Option<Challenge> {
        self.providers
            .iter()
            .find(|(_, re)| re.is_match(body))
            .map(|(provider, _)| Challenge {
                provider: provider.name.clone(),
                cooldown: if provider.cooldown_secs > 0 {
                    Duration::from_secs(provider.cooldown_secs)
                } else {
                    self.default_cooldown
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_known_providers() {
        let detector = ChallengeDetector::new(&ChallengeConfig::default());

        let cf = detector
            .detect(r#"<form id="challenge-form" action="/cdn-cgi/l/chk_jschl">"#)
            .unwrap();
        assert_eq!(cf.provider, "cloudflare");
        assert_eq!(cf.cooldown, Duration::from_secs(300));

        let imperva = detector.detect("location: /distil_r_blocked.html").unwrap();
        assert_eq!(imperva.cooldown, Duration::from_secs(600));

        let px = detector.detect("<div id='_PXCUSTOMERLOGO'>").unwrap();
        assert_eq!(px.provider, "perimeterx");

        assert!(detector.detect("<h1>Real Madrid tickets</h1>").is_none());
    }

    #[test]
    fn test_zero_cooldown_uses_default_and_bad_pattern_skipped() {
        let config = ChallengeConfig {
            providers: vec![
                ChallengeProvider::new("broken", "(unclosed", 10),
                ChallengeProvider::new("akamai", "ak_bmsc", 0),
            ],
            default_cooldown_secs: 90,
            blocked_cooldown_secs: 60,
        };
        let detector = ChallengeDetector::new(&config);
        let challenge = detector.detect("cookie ak_bmsc=1").unwrap();
        assert_eq!(challenge.provider, "akamai");
        assert_eq!(challenge.cooldown, Duration::from_secs(90));
    }
}
