use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::BrowserArchetype;

/// `[fingerprint]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FingerprintConfig {
    /// How long a platform keeps presenting the same visitor profile.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Archetype weights for platforms without their own `browser_weights`.
    #[serde(default = "default_weights")]
    pub default_weights: BTreeMap<BrowserArchetype, f64>,
    /// Fixed PRNG seed. Unset means seeded from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

pub fn default_weights() -> BTreeMap<BrowserArchetype, f64> {
    BTreeMap::from([
        (BrowserArchetype::ChromeWindows, 0.4),
        (BrowserArchetype::ChromeMac, 0.2),
        (BrowserArchetype::FirefoxWindows, 0.3),
        (BrowserArchetype::SafariMac, 0.1),
    ])
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            default_weights: default_weights(),
            seed: None,
        }
    }
}

/// A consistent browser identity presented by one session.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionProfile {
    pub archetype: BrowserArchetype,
    pub user_agent: String,
    pub viewport: String,
    pub screen: String,
    /// `Accept-Language` value.
    pub language: String,
    pub timezone: String,
    pub platform: String,
    pub hardware_concurrency: u8,
    pub device_memory_gb: u8,
    /// Ordered headers sent with every request, minus the per-request ones.
    pub headers: Vec<(String, String)>,
}

impl SessionProfile {
    /// Full ordered header set for one request.
    ///
    /// `Sec-Fetch-Site` and `Referer` depend on whether the request follows
    /// a page on the same site.
    pub fn request_headers(&self, referer: Option<&str>) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(self.headers.len() + 2);
        for (name, value) in &self.headers {
            headers.push((name.clone(), value.clone()));
            if name == "Sec-Fetch-Mode" {
                let site = if referer.is_some() { "same-origin" } else { "none" };
                headers.push(("Sec-Fetch-Site".to_string(), site.to_string()));
            }
        }
        if let Some(referer) = referer {
            headers.push(("Referer".to_string(), referer.to_string()));
        }
        headers
    }
}
