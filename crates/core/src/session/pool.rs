use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::PlatformSession;
use super::{PoolStatus, SessionLease, SessionPoolConfig};
use crate::config::PlatformConfig;
use crate::delay::{ActionKind, Delayer};
use crate::fetch::{FetchRequest, Fetcher, RateLimiterPool};
use crate::fingerprint::HeaderSynthesizer;
use crate::metrics;

#[derive(Default)]
struct PoolState {
    sessions: HashMap<String, Vec<PlatformSession>>,
    /// Size most recently requested per platform; `rotate` never grows past it.
    limits: HashMap<String, usize>,
}

/// Owns every session. Callers get [`SessionLease`] snapshots and report
/// back through `record_*`, `rotate` and `release`.
pub struct SessionPool {
    config: SessionPoolConfig,
    fetcher: Arc<dyn Fetcher>,
    synthesizer: Arc<dyn HeaderSynthesizer>,
    delayer: Arc<dyn Delayer>,
    limiter: Option<Arc<RateLimiterPool>>,
    state: Mutex<PoolState>,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionPool {
    pub fn new(
        config: SessionPoolConfig,
        fetcher: Arc<dyn Fetcher>,
        synthesizer: Arc<dyn HeaderSynthesizer>,
        delayer: Arc<dyn Delayer>,
    ) -> Self {
        Self {
            config,
            fetcher,
            synthesizer,
            delayer,
            limiter: None,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Pre-warm requests also spend rate-limit tokens.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiterPool>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Return `pool_size` active sessions for a platform, creating and
    /// pre-warming new ones as needed.
    ///
    /// Inactive sessions are evicted first and the pool is trimmed to
    /// `pool_size`, so the platform never holds more sessions than asked.
    pub async fn acquire(
        &self,
        platform: &PlatformConfig,
        pool_size: usize,
        cancel: &CancellationToken,
    ) -> Vec<SessionLease> {
        let missing = {
            let mut state = self.state.lock().await;
            state.limits.insert(platform.id.clone(), pool_size);
            let sessions = state.sessions.entry(platform.id.clone()).or_default();
            let now = Instant::now();
            let before = sessions.len();
            sessions.retain(|s| s.is_active(&self.config, now));
            if sessions.len() < before {
                debug!(
                    platform = %platform.id,
                    evicted = before - sessions.len(),
                    "Evicted inactive sessions"
                );
            }
            sessions.truncate(pool_size);
            pool_size - sessions.len()
        };

        if missing > 0 {
            let created =
                join_all((0..missing).map(|_| self.create_session(platform, false, cancel))).await;

            let mut state = self.state.lock().await;
            let sessions = state.sessions.entry(platform.id.clone()).or_default();
            for session in created {
                if sessions.len() >= pool_size {
                    break;
                }
                sessions.push(session);
            }
        }

        let mut state = self.state.lock().await;
        let now = Instant::now();
        state
            .sessions
            .get_mut(&platform.id)
            .map(|sessions| {
                sessions
                    .iter_mut()
                    .take(pool_size)
                    .map(|s| {
                        s.last_used = now;
                        s.lease(&platform.id)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace the session `session_id` with one carrying a freshly drawn
    /// identity.
    ///
    /// Executions share the pool, so the replacement goes where that session
    /// is now, not where it sat when it was leased. If it was evicted in the
    /// meantime the new session only joins the pool while there is room.
    pub async fn rotate(
        &self,
        platform: &PlatformConfig,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> SessionLease {
        let session = self.create_session(platform, true, cancel).await;
        let lease = session.lease(&platform.id);

        let mut state = self.state.lock().await;
        let limit = state.limits.get(&platform.id).copied().unwrap_or(usize::MAX);
        let sessions = state.sessions.entry(platform.id.clone()).or_default();
        let replaced = match sessions.iter().position(|s| s.id == session_id) {
            Some(index) => {
                sessions[index] = session;
                true
            }
            None => {
                if sessions.len() < limit {
                    sessions.push(session);
                } else {
                    debug!(platform = %platform.id, session = %lease.id, "Pool full, rotated session stays unpooled");
                }
                false
            }
        };

        metrics::SESSIONS_ROTATED
            .with_label_values(&[platform.id.as_str()])
            .inc();
        info!(
            platform = %platform.id,
            previous = %session_id,
            replaced,
            session = %lease.id,
            "Rotated session"
        );
        lease
    }

    /// Record a successful request and merge any new cookies. Returns the
    /// refreshed lease, or `None` if the session has since been evicted.
    pub async fn record_success(
        &self,
        platform: &str,
        session_id: &str,
        cookies: Vec<(String, String)>,
    ) -> Option<SessionLease> {
        let mut state = self.state.lock().await;
        let session = find(&mut state, platform, session_id)?;
        session.last_used = Instant::now();
        session.requests += 1;
        session.consecutive_failures = 0;
        session.store_cookies(cookies);
        Some(session.lease(platform))
    }

    /// Record a failed request. Returns whether the session is still healthy.
    pub async fn record_failure(&self, platform: &str, session_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let max_failures = self.config.max_failures.max(1);
        match find(&mut state, platform, session_id) {
            Some(session) => {
                session.last_used = Instant::now();
                session.requests += 1;
                session.consecutive_failures += 1;
                if session.consecutive_failures >= max_failures {
                    session.healthy = false;
                    debug!(platform = %platform, session = %session_id, "Session marked unhealthy");
                }
                session.healthy
            }
            None => false,
        }
    }

    pub async fn mark_unhealthy(&self, platform: &str, session_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(session) = find(&mut state, platform, session_id) {
            session.healthy = false;
        }
    }

    /// Drop every session of a platform. Returns how many were dropped.
    pub async fn release(&self, platform: &str) -> usize {
        let mut state = self.state.lock().await;
        state.limits.remove(platform);
        let released = state.sessions.remove(platform).map_or(0, |s| s.len());
        if released > 0 {
            debug!(platform = %platform, released, "Released sessions");
        }
        released
    }

    /// Drop inactive sessions on every platform.
    pub async fn evict_idle(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let mut evicted = 0;
        for sessions in state.sessions.values_mut() {
            let before = sessions.len();
            sessions.retain(|s| s.is_active(&self.config, now));
            evicted += before - sessions.len();
        }
        state.sessions.retain(|_, sessions| !sessions.is_empty());
        evicted
    }

    pub async fn active_count(&self, platform: &str) -> usize {
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .sessions
            .get(platform)
            .map_or(0, |s| s.iter().filter(|s| s.is_active(&self.config, now)).count())
    }

    pub async fn status(&self) -> Vec<PoolStatus> {
        let state = self.state.lock().await;
        let mut all: Vec<_> = state
            .sessions
            .iter()
            .map(|(platform, sessions)| PoolStatus {
                platform: platform.clone(),
                sessions: sessions.len(),
                healthy: sessions.iter().filter(|s| s.healthy).count(),
                prewarmed: sessions.iter().filter(|s| s.prewarmed).count(),
                requests: sessions.iter().map(|s| s.requests).sum(),
            })
            .collect();
        all.sort_by(|a, b| a.platform.cmp(&b.platform));
        all
    }

    /// Evict idle sessions every `every` until cancelled.
    pub async fn run_eviction(self: Arc<Self>, every: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Session eviction loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let evicted = self.evict_idle().await;
                    if evicted > 0 {
                        info!(evicted, "Evicted idle sessions");
                    }
                }
            }
        }
    }

    async fn create_session(
        &self,
        platform: &PlatformConfig,
        fresh: bool,
        cancel: &CancellationToken,
    ) -> PlatformSession {
        let profile = if fresh {
            self.synthesizer.fresh_profile(&platform.id)
        } else {
            self.synthesizer.profile_for(&platform.id)
        };
        let mut session = PlatformSession::new(profile);

        if self.config.prewarm {
            session.prewarmed = self.prewarm(platform, &mut session, cancel).await;
        }

        metrics::SESSIONS_CREATED
            .with_label_values(&[platform.id.as_str(), if session.prewarmed { "true" } else { "false" }])
            .inc();
        debug!(
            platform = %platform.id,
            session = %session.id,
            archetype = %session.profile.archetype,
            prewarmed = session.prewarmed,
            "Created session"
        );
        session
    }

    /// Visit the home page, pause like a reader, then open the tickets page.
    /// Failures only cost realism, so they are logged and reported as `false`.
    async fn prewarm(
        &self,
        platform: &PlatformConfig,
        session: &mut PlatformSession,
        cancel: &CancellationToken,
    ) -> bool {
        let home = platform.home_url();
        let steps = [(home.clone(), None), (platform.tickets_url(), Some(home.as_str()))];

        for (step, (url, referer)) in steps.iter().enumerate() {
            if step > 0 {
                let delay = self
                    .delayer
                    .delay_for(ActionKind::Navigation, platform.delay_multiplier);
                if !self.delayer.pause(delay, cancel).await {
                    return false;
                }
            }
            if let Some(limiter) = &self.limiter {
                if !limiter.acquire(&platform.id, cancel).await {
                    return false;
                }
            }

            let request = FetchRequest::new(url.clone(), self.config.prewarm_timeout())
                .with_headers(session.headers(*referer));
            match self.fetcher.fetch(&request).await {
                Ok(response) if (200..400).contains(&response.status) => {
                    session.requests += 1;
                    session.store_cookies(response.cookies());
                }
                Ok(response) => {
                    warn!(
                        platform = %platform.id,
                        url = %url,
                        status = response.status,
                        "Pre-warm request rejected"
                    );
                    return false;
                }
                Err(e) => {
                    warn!(platform = %platform.id, url = %url, error = %e, "Pre-warm request failed");
                    return false;
                }
            }
        }
        true
    }
}

fn find<'a>(
    state: &'a mut PoolState,
    platform: &str,
    session_id: &str,
) -> Option<&'a mut PlatformSession> {
    state
        .sessions
        .get_mut(platform)?
        .iter_mut()
        .find(|s| s.id == session_id)
}
