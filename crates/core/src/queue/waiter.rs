//! Waiting out a virtual queue.
//!
//! The execution that owns the marker keeps polling the queue page and
//! publishes what it sees; every other caller only watches the marker.
//! A marker whose owner stops publishing for two intervals is adopted by
//! one of its watchers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::tracker::parse_queue_page;
use super::{QueueError, QueueTracker};
use crate::fetch::{FetchRequest, Fetcher};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WaitOutcome {
    /// Near the front or the queue is gone; scraping may resume.
    Resume,
    /// The previous owner went quiet and this caller now owns the marker.
    Adopted,
    /// The wait ceiling was reached.
    Expired,
    Cancelled,
}

impl QueueTracker {
    /// Poll the queue page every `interval` as the marker owner.
    ///
    /// A page that no longer looks like a queue clears the marker so that
    /// passive waiters resume too. Leaving by cancellation or at the wait
    /// ceiling releases the marker as well.
    pub async fn wait_as_owner(
        &self,
        platform: &str,
        owner: &str,
        fetcher: &dyn Fetcher,
        probe: &FetchRequest,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, QueueError> {
        let outcome = self
            .poll_as_owner(platform, fetcher, probe, interval, cancel)
            .await?;
        if matches!(outcome, WaitOutcome::Expired | WaitOutcome::Cancelled)
            && self.release(platform, owner).await?
        {
            debug!(platform = %platform, owner = %owner, outcome = ?outcome, "Released queue marker");
        }
        Ok(outcome)
    }

    async fn poll_as_owner(
        &self,
        platform: &str,
        fetcher: &dyn Fetcher,
        probe: &FetchRequest,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, QueueError> {
        let started = Instant::now();
        let threshold = self.config().near_front_threshold;

        loop {
            if !self.sleep_within_ceiling(started, interval, cancel).await? {
                return Ok(finish(platform, started, cancel));
            }

            let response = tokio::select! {
                _ = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
                r = fetcher.fetch(probe) => r,
            };
            let body = match response {
                Ok(response) => response.body,
                Err(e) => {
                    warn!(platform = %platform, error = %e, "Queue probe failed");
                    // Still alive, keep watchers from adopting the marker
                    self.update_position(platform, None, None).await?;
                    continue;
                }
            };

            if !self.matches_signature(&body) {
                info!(platform = %platform, "Queue page cleared, resuming");
                self.clear(platform).await?;
                return Ok(WaitOutcome::Resume);
            }

            let (position, wait) = parse_queue_page(&body);
            self.update_position(platform, position, wait).await?;
            debug!(
                platform = %platform,
                position = ?position,
                estimated_wait_secs = ?wait,
                "Queue position polled"
            );
            if position.is_some_and(|p| p <= threshold) {
                info!(platform = %platform, position = ?position, "Near the front of the queue");
                return Ok(WaitOutcome::Resume);
            }
        }
    }

    /// Watch the shared marker every `interval` without touching the
    /// platform. An expired or cleared marker means the queue is over.
    ///
    /// A marker left unchanged for two intervals is adopted under
    /// `waiter`, which then has to poll the queue itself.
    pub async fn wait_passively(
        &self,
        platform: &str,
        waiter: &str,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, QueueError> {
        let started = Instant::now();
        let threshold = self.config().near_front_threshold;
        let stale_after = interval * 2;
        let mut last_seen: Option<(DateTime<Utc>, Instant)> = None;

        loop {
            match self.state(platform).await? {
                None => return Ok(WaitOutcome::Resume),
                Some(state) if state.is_near_front(threshold) => {
                    debug!(platform = %platform, position = ?state.position, "Shared queue near the front");
                    return Ok(WaitOutcome::Resume);
                }
                Some(state) => match last_seen {
                    Some((stamp, since)) if stamp == state.updated_at => {
                        if since.elapsed() >= stale_after
                            && self.adopt(platform, waiter, stamp, stale_after).await?
                        {
                            return Ok(WaitOutcome::Adopted);
                        }
                    }
                    _ => last_seen = Some((state.updated_at, Instant::now())),
                },
            }
            if !self.sleep_within_ceiling(started, interval, cancel).await? {
                return Ok(finish(platform, started, cancel));
            }
        }
    }

    /// Sleep up to `interval` without passing the wait ceiling. Returns
    /// `false` once cancelled or out of time.
    async fn sleep_within_ceiling(
        &self,
        started: Instant,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool, QueueError> {
        let remaining = self.config().max_wait().saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Ok(false);
        }
        tokio::select! {
            _ = cancel.cancelled() => Ok(false),
            _ = tokio::time::sleep(interval.min(remaining)) => {
                Ok(started.elapsed() < self.config().max_wait())
            }
        }
    }
}

fn finish(platform: &str, started: Instant, cancel: &CancellationToken) -> WaitOutcome {
    if cancel.is_cancelled() {
        WaitOutcome::Cancelled
    } else {
        info!(
            platform = %platform,
            waited_secs = started.elapsed().as_secs(),
            "Queue wait ceiling reached"
        );
        WaitOutcome::Expired
    }
}
