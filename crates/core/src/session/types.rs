use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::fingerprint::SessionProfile;

/// `[sessions]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionPoolConfig {
    /// Sessions unused for longer than this are evicted.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    /// Sessions older than this are evicted regardless of use.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Consecutive failed requests before a session is marked unhealthy.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Fetch the home and tickets pages before a new session is used.
    #[serde(default = "default_prewarm")]
    pub prewarm: bool,
    /// Timeout of each pre-warm request.
    #[serde(default = "default_prewarm_timeout_secs")]
    pub prewarm_timeout_secs: u64,
}

fn default_idle_ttl_secs() -> u64 {
    900
}

fn default_max_age_secs() -> u64 {
    3600
}

fn default_max_failures() -> u32 {
    3
}

fn default_prewarm() -> bool {
    true
}

fn default_prewarm_timeout_secs() -> u64 {
    15
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl_secs(),
            max_age_secs: default_max_age_secs(),
            max_failures: default_max_failures(),
            prewarm: default_prewarm(),
            prewarm_timeout_secs: default_prewarm_timeout_secs(),
        }
    }
}

impl SessionPoolConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn prewarm_timeout(&self) -> Duration {
        Duration::from_secs(self.prewarm_timeout_secs.max(1))
    }
}

/// A pooled session. Owned by the pool; callers only see [`SessionLease`]s.
#[derive(Debug, Clone)]
pub(crate) struct PlatformSession {
    pub id: String,
    pub profile: SessionProfile,
    pub cookies: BTreeMap<String, String>,
    pub created_at: Instant,
    pub last_used: Instant,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub requests: u64,
    pub prewarmed: bool,
}

impl PlatformSession {
    pub fn new(profile: SessionProfile) -> Self {
        let now = Instant::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            profile,
            cookies: BTreeMap::new(),
            created_at: now,
            last_used: now,
            healthy: true,
            consecutive_failures: 0,
            requests: 0,
            prewarmed: false,
        }
    }

    /// Liveness probe: healthy, recently used and not too old.
    pub fn is_active(&self, config: &SessionPoolConfig, now: Instant) -> bool {
        self.healthy
            && now.duration_since(self.last_used) < config.idle_ttl()
            && now.duration_since(self.created_at) < config.max_age()
    }

    pub fn store_cookies(&mut self, cookies: Vec<(String, String)>) {
        self.cookies.extend(cookies);
    }

    /// Request headers with the session's cookies attached.
    pub fn headers(&self, referer: Option<&str>) -> Vec<(String, String)> {
        with_cookies(self.profile.request_headers(referer), cookie_header(&self.cookies))
    }

    pub fn lease(&self, platform: &str) -> SessionLease {
        SessionLease {
            id: self.id.clone(),
            platform: platform.to_string(),
            profile: self.profile.clone(),
            cookie_header: cookie_header(&self.cookies),
            prewarmed: self.prewarmed,
        }
    }
}

fn with_cookies(mut headers: Vec<(String, String)>, cookie: Option<String>) -> Vec<(String, String)> {
    if let Some(cookie) = cookie {
        headers.push(("Cookie".to_string(), cookie));
    }
    headers
}

fn cookie_header(cookies: &BTreeMap<String, String>) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Snapshot of a session handed to the executor for one or more requests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLease {
    pub id: String,
    pub platform: String,
    pub profile: SessionProfile,
    pub cookie_header: Option<String>,
    pub prewarmed: bool,
}

impl SessionLease {
    /// Request headers for this session, with its cookies attached.
    pub fn headers(&self, referer: Option<&str>) -> Vec<(String, String)> {
        with_cookies(self.profile.request_headers(referer), self.cookie_header.clone())
    }
}

/// Pool occupancy for one platform.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PoolStatus {
    pub platform: String,
    pub sessions: usize,
    pub healthy: usize,
    pub prewarmed: usize,
    pub requests: u64,
}
