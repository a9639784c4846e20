//! Static browser archetype tables.

use serde::{Deserialize, Serialize};

/// A browser/OS combination a session can present as.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BrowserArchetype {
    ChromeWindows,
    ChromeMac,
    FirefoxWindows,
    SafariMac,
}

const CHROME_VERSIONS: &[(&str, &str)] = &[
    ("119", "119.0.6045.199"),
    ("120", "120.0.6099.109"),
    ("121", "121.0.6167.85"),
    ("122", "122.0.6261.94"),
];
const FIREFOX_VERSIONS: &[&str] = &["119.0", "120.0", "121.0", "122.0"];
const SAFARI_VERSIONS: &[&str] = &["17.1", "17.2", "17.3"];

const CHROME_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const FIREFOX_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const SAFARI_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

impl BrowserArchetype {
    pub const ALL: [BrowserArchetype; 4] = [
        BrowserArchetype::ChromeWindows,
        BrowserArchetype::ChromeMac,
        BrowserArchetype::FirefoxWindows,
        BrowserArchetype::SafariMac,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserArchetype::ChromeWindows => "chrome_windows",
            BrowserArchetype::ChromeMac => "chrome_mac",
            BrowserArchetype::FirefoxWindows => "firefox_windows",
            BrowserArchetype::SafariMac => "safari_mac",
        }
    }

    pub fn is_chromium(&self) -> bool {
        matches!(
            self,
            BrowserArchetype::ChromeWindows | BrowserArchetype::ChromeMac
        )
    }

    pub fn viewports(&self) -> &'static [&'static str] {
        match self {
            BrowserArchetype::ChromeWindows => &["1920x1080", "1366x768", "1536x864", "1440x900"],
            BrowserArchetype::ChromeMac => &["1440x900", "1680x1050", "1920x1080"],
            BrowserArchetype::FirefoxWindows => &["1920x1080", "1366x768", "1536x864"],
            BrowserArchetype::SafariMac => &["1440x900", "1680x1050", "1920x1080", "2560x1600"],
        }
    }

    pub fn languages(&self) -> &'static [&'static str] {
        match self {
            BrowserArchetype::ChromeWindows => &[
                "en-US,en;q=0.9",
                "en-GB,en;q=0.9",
                "de-DE,de;q=0.9",
                "es-ES,es;q=0.9",
            ],
            BrowserArchetype::ChromeMac | BrowserArchetype::SafariMac => {
                &["en-US,en;q=0.9", "en-GB,en;q=0.9"]
            }
            BrowserArchetype::FirefoxWindows => {
                &["en-US,en;q=0.5", "de-DE,de;q=0.5", "es-ES,es;q=0.5"]
            }
        }
    }

    pub fn timezones(&self) -> &'static [&'static str] {
        match self {
            BrowserArchetype::ChromeWindows => {
                &["Europe/London", "Europe/Berlin", "Europe/Madrid", "Europe/Paris"]
            }
            BrowserArchetype::ChromeMac => &["Europe/London", "America/New_York"],
            BrowserArchetype::FirefoxWindows => &["Europe/London", "Europe/Berlin", "Europe/Madrid"],
            BrowserArchetype::SafariMac => &["Europe/London", "America/New_York", "Europe/Paris"],
        }
    }

    /// `navigator.platform` value.
    pub fn platform(&self) -> &'static str {
        match self {
            BrowserArchetype::ChromeWindows | BrowserArchetype::FirefoxWindows => "Win32",
            BrowserArchetype::ChromeMac | BrowserArchetype::SafariMac => "MacIntel",
        }
    }

    pub fn hardware_concurrency(&self) -> &'static [u8] {
        match self {
            BrowserArchetype::ChromeWindows => &[4, 8, 12, 16],
            BrowserArchetype::ChromeMac => &[4, 8, 10],
            BrowserArchetype::FirefoxWindows => &[4, 8, 12],
            BrowserArchetype::SafariMac => &[4, 8, 10, 12],
        }
    }

    pub fn device_memory_gb(&self) -> &'static [u8] {
        match self {
            BrowserArchetype::ChromeWindows | BrowserArchetype::FirefoxWindows => &[4, 8, 16],
            BrowserArchetype::ChromeMac | BrowserArchetype::SafariMac => &[8, 16, 32],
        }
    }

    /// Number of browser versions a user agent can be built for.
    pub fn version_count(&self) -> usize {
        match self {
            BrowserArchetype::ChromeWindows | BrowserArchetype::ChromeMac => CHROME_VERSIONS.len(),
            BrowserArchetype::FirefoxWindows => FIREFOX_VERSIONS.len(),
            BrowserArchetype::SafariMac => SAFARI_VERSIONS.len(),
        }
    }

    /// User agent for the version at `index` (wrapped to the table size).
    pub fn user_agent(&self, index: usize) -> String {
        let i = index % self.version_count();
        match self {
            BrowserArchetype::ChromeWindows => format!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.0.0 Safari/537.36",
                CHROME_VERSIONS[i].0
            ),
            BrowserArchetype::ChromeMac => format!(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.0.0 Safari/537.36",
                CHROME_VERSIONS[i].0
            ),
            BrowserArchetype::FirefoxWindows => format!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:{v}) Gecko/20100101 Firefox/{v}",
                v = FIREFOX_VERSIONS[i]
            ),
            BrowserArchetype::SafariMac => format!(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{} Safari/605.1.15",
                SAFARI_VERSIONS[i]
            ),
        }
    }

    pub fn accept(&self) -> &'static str {
        match self {
            BrowserArchetype::ChromeWindows | BrowserArchetype::ChromeMac => CHROME_ACCEPT,
            BrowserArchetype::FirefoxWindows => FIREFOX_ACCEPT,
            BrowserArchetype::SafariMac => SAFARI_ACCEPT,
        }
    }

    /// Client hints sent by Chromium browsers for the version at `index`.
    ///
    /// Returns an empty list for browsers that do not send `sec-ch-*` headers.
    pub fn client_hints(&self, index: usize) -> Vec<(&'static str, String)> {
        if !self.is_chromium() {
            return Vec::new();
        }
        let (major, full) = CHROME_VERSIONS[index % CHROME_VERSIONS.len()];
        let platform = match self {
            BrowserArchetype::ChromeWindows => "\"Windows\"",
            _ => "\"macOS\"",
        };
        vec![
            (
                "sec-ch-ua",
                format!(
                    "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"{major}\", \"Google Chrome\";v=\"{major}\""
                ),
            ),
            ("sec-ch-ua-mobile", "?0".to_string()),
            ("sec-ch-ua-platform", platform.to_string()),
            (
                "sec-ch-ua-full-version-list",
                format!(
                    "\"Not_A Brand\";v=\"8.0.0.0\", \"Chromium\";v=\"{full}\", \"Google Chrome\";v=\"{full}\""
                ),
            ),
            ("sec-ch-ua-arch", "\"x86\"".to_string()),
            ("sec-ch-ua-bitness", "\"64\"".to_string()),
        ]
    }
}

impl std::fmt::Display for BrowserArchetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
