use async_trait::async_trait;

use crate::config::PlatformConfig;
use crate::session::SessionLease;

#[derive(Debug, Clone, PartialEq)]
pub enum BypassOutcome {
    /// Scraping may resume with this session.
    Admitted(SessionLease),
    Declined(String),
}

/// Hook consulted when a strategy allows leaving a virtual queue early.
#[async_trait]
pub trait QueueBypass: Send + Sync {
    async fn attempt(
        &self,
        platform: &PlatformConfig,
        session: &SessionLease,
        queue_page: &str,
    ) -> BypassOutcome;
}

/// Never leaves the queue early; callers fall through to waiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineBypass;

#[async_trait]
impl QueueBypass for DeclineBypass {
    async fn attempt(
        &self,
        platform: &PlatformConfig,
        _session: &SessionLease,
        _queue_page: &str,
    ) -> BypassOutcome {
        tracing::debug!(platform = %platform.id, "Queue bypass declined");
        BypassOutcome::Declined("waiting in queue".to_string())
    }
}
