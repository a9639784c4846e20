//! Shared in-queue markers over the key-value store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::{debug, info, warn};

use super::{QueueConfig, QueueError, QueueState};
use crate::kv::{KeyValueStore, StoreError};

static POSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:queue position|position in (?:the )?(?:queue|line)|your position|you are (?:number|no\.?|#))\D{0,20}?([\d,.]+)",
    )
    .unwrap()
});

static WAIT_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:estimated wait(?:ing)?(?: time)?|wait time)\D{0,20}?(\d+)\s*(hours?|hrs?|h|minutes?|mins?|m|seconds?|secs?|s)?\b",
    )
    .unwrap()
});

pub fn queue_key(platform: &str) -> String {
    format!("queue_active:{}", platform)
}

fn takeover_key(platform: &str) -> String {
    format!("queue_takeover:{}", platform)
}

/// Reads and writes the per-platform [`QueueState`].
///
/// Writers race through `set_if_absent`, so exactly one caller owns a
/// detected queue until its marker expires or is cleared.
pub struct QueueTracker {
    store: Arc<dyn KeyValueStore>,
    config: QueueConfig,
    signatures: Vec<String>,
}

impl std::fmt::Debug for QueueTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueTracker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueueTracker {
    pub fn new(config: QueueConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let signatures = config
            .signatures
            .iter()
            .map(|s| s.to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            store,
            config,
            signatures,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Whether a response body looks like a waiting-room page.
    pub fn matches_signature(&self, body: &str) -> bool {
        let body = body.to_lowercase();
        self.signatures.iter().any(|s| body.contains(s.as_str()))
    }

    /// Try to become the owner of a newly detected queue. Returns `false`
    /// when a live marker held by someone else already exists.
    pub async fn mark_in_queue(
        &self,
        platform: &str,
        owner: &str,
        body: &str,
    ) -> Result<bool, QueueError> {
        let (position, estimated_wait_secs) = parse_queue_page(body);
        let now = Utc::now();
        let state = QueueState {
            platform: platform.to_string(),
            in_queue: true,
            position,
            estimated_wait_secs,
            owner: owner.to_string(),
            detected_at: now,
            updated_at: now,
        };

        let won = self
            .store
            .set_if_absent(
                &queue_key(platform),
                encode(&state)?,
                Some(self.config.marker_ttl()),
            )
            .await?;
        if won {
            info!(
                platform = %platform,
                owner = %owner,
                position = ?position,
                estimated_wait_secs = ?estimated_wait_secs,
                "Marked platform in queue"
            );
            return Ok(true);
        }
        if self.state(platform).await?.is_some_and(|s| s.owner == owner) {
            debug!(platform = %platform, owner = %owner, "Queue already marked by this caller");
            return Ok(true);
        }
        debug!(platform = %platform, "Queue already marked by another caller");
        Ok(false)
    }

    pub async fn state(&self, platform: &str) -> Result<Option<QueueState>, QueueError> {
        let key = queue_key(platform);
        match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                QueueError::Store(StoreError::Malformed {
                    key,
                    reason: e.to_string(),
                })
            }),
            None => Ok(None),
        }
    }

    pub async fn is_in_queue(&self, platform: &str) -> Result<bool, QueueError> {
        Ok(self.state(platform).await?.is_some_and(|s| s.in_queue))
    }

    /// Publish a newer position and estimate, keeping the marker's
    /// remaining lifetime. Returns `false` if the marker is gone.
    pub async fn update_position(
        &self,
        platform: &str,
        position: Option<u32>,
        estimated_wait_secs: Option<u64>,
    ) -> Result<bool, QueueError> {
        let key = queue_key(platform);
        let Some(mut state) = self.state(platform).await? else {
            return Ok(false);
        };
        let ttl = self.store.ttl(&key).await?;
        if ttl.is_some_and(|t| t.is_zero()) {
            return Ok(false);
        }

        state.position = position.or(state.position);
        state.estimated_wait_secs = estimated_wait_secs.or(state.estimated_wait_secs);
        state.updated_at = Utc::now();
        self.store.put(&key, encode(&state)?, ttl).await?;
        debug!(platform = %platform, position = ?state.position, "Updated queue position");
        Ok(true)
    }

    /// Remove the marker. Returns whether one existed.
    pub async fn clear(&self, platform: &str) -> Result<bool, QueueError> {
        let cleared = self.store.forget(&queue_key(platform)).await?;
        if cleared {
            info!(platform = %platform, "Cleared queue marker");
        }
        Ok(cleared)
    }

    /// Remove the marker only while `owner` still holds it.
    pub async fn release(&self, platform: &str, owner: &str) -> Result<bool, QueueError> {
        match self.state(platform).await? {
            Some(state) if state.owner == owner => self.clear(platform).await,
            _ => Ok(false),
        }
    }

    /// Take over a marker whose owner stopped publishing.
    ///
    /// `seen` is the `updated_at` the caller watched go stale; the marker is
    /// only rewritten if it still carries that stamp. The takeover key keeps
    /// concurrent waiters from all claiming the same marker.
    pub async fn adopt(
        &self,
        platform: &str,
        owner: &str,
        seen: DateTime<Utc>,
        hold: Duration,
    ) -> Result<bool, QueueError> {
        let claimed = self
            .store
            .set_if_absent(&takeover_key(platform), owner.to_string(), Some(hold))
            .await?;
        if !claimed {
            return Ok(false);
        }

        let key = queue_key(platform);
        let Some(mut state) = self.state(platform).await? else {
            return Ok(false);
        };
        if state.updated_at != seen {
            return Ok(false);
        }
        let ttl = self.store.ttl(&key).await?;
        if ttl.is_some_and(|t| t.is_zero()) {
            return Ok(false);
        }

        let previous = std::mem::replace(&mut state.owner, owner.to_string());
        state.updated_at = Utc::now();
        self.store.put(&key, encode(&state)?, ttl).await?;
        warn!(
            platform = %platform,
            previous = %previous,
            owner = %owner,
            "Took over stale queue marker"
        );
        Ok(true)
    }

    /// Time left on the marker.
    pub async fn remaining(&self, platform: &str) -> Result<Option<Duration>, QueueError> {
        Ok(self.store.ttl(&queue_key(platform)).await?)
    }
}

fn encode(state: &QueueState) -> Result<String, QueueError> {
    serde_json::to_string(state).map_err(|e| {
        QueueError::Store(StoreError::Malformed {
            key: queue_key(&state.platform),
            reason: e.to_string(),
        })
    })
}

/// Position and estimated wait (seconds) shown on a queue page, if any.
pub fn parse_queue_page(body: &str) -> (Option<u32>, Option<u64>) {
    let position = POSITION.captures(body).and_then(|caps| {
        let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
        digits.parse().ok()
    });

    let wait = WAIT_TIME.captures(body).and_then(|caps| {
        let value: u64 = caps[1].parse().ok()?;
        let unit = caps.get(2).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        let factor = match unit.chars().next() {
            Some('h') => 3600,
            Some('s') => 1,
            // Queue pages quote minutes unless they say otherwise
            _ => 60,
        };
        Some(value * factor)
    });

    (position, wait)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn tracker() -> QueueTracker {
        QueueTracker::new(QueueConfig::default(), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_signature_match_is_case_insensitive() {
        let tracker = tracker();
        assert!(tracker.matches_signature("<h1>Estimated Wait Time: 12 minutes</h1>"));
        assert!(tracker.matches_signature("Powered by Queue-it"));
        assert!(!tracker.matches_signature("<h1>Tickets</h1>"));
    }

    #[test]
    fn test_parse_queue_page() {
        assert_eq!(
            parse_queue_page("Your queue position: 1,234. Estimated wait time: 15 minutes"),
            (Some(1234), Some(900))
        );
        assert_eq!(
            parse_queue_page("You are number 8 in line. Estimated wait: 2 hours"),
            (Some(8), Some(7200))
        );
        assert_eq!(parse_queue_page("estimated wait time 45"), (None, Some(2700)));
        assert_eq!(parse_queue_page("please wait"), (None, None));
    }

    #[tokio::test]
    async fn test_mark_in_queue_single_owner() {
        let tracker = tracker();
        assert!(tracker
            .mark_in_queue("real_madrid", "exec-1", "queue position 500")
            .await
            .unwrap());
        assert!(!tracker
            .mark_in_queue("real_madrid", "exec-2", "queue position 10")
            .await
            .unwrap());

        let state = tracker.state("real_madrid").await.unwrap().unwrap();
        assert_eq!(state.owner, "exec-1");
        assert_eq!(state.position, Some(500));
        assert!(tracker.is_in_queue("real_madrid").await.unwrap());
        assert!(!tracker.is_in_queue("barcelona").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_position_preserves_ttl() {
        let tracker = tracker();
        tracker.mark_in_queue("psg", "exec-1", "virtual queue").await.unwrap();
        tokio::time::advance(Duration::from_secs(600)).await;

        assert!(tracker.update_position("psg", Some(42), Some(300)).await.unwrap());
        let state = tracker.state("psg").await.unwrap().unwrap();
        assert_eq!(state.position, Some(42));
        assert_eq!(state.estimated_wait_secs, Some(300));
        assert_eq!(
            tracker.remaining("psg").await.unwrap(),
            Some(Duration::from_secs(3000))
        );

        tokio::time::advance(Duration::from_secs(3000)).await;
        assert!(!tracker.is_in_queue("psg").await.unwrap());
        assert!(!tracker.update_position("psg", Some(1), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_in_queue_is_reentrant_for_owner() {
        let tracker = tracker();
        assert!(tracker.mark_in_queue("psg", "exec-1", "virtual queue").await.unwrap());
        assert!(tracker.mark_in_queue("psg", "exec-1", "virtual queue").await.unwrap());
        assert!(!tracker.mark_in_queue("psg", "exec-2", "virtual queue").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_only_by_owner() {
        let tracker = tracker();
        tracker.mark_in_queue("psg", "exec-1", "virtual queue").await.unwrap();
        assert!(!tracker.release("psg", "exec-2").await.unwrap());
        assert!(tracker.is_in_queue("psg").await.unwrap());
        assert!(tracker.release("psg", "exec-1").await.unwrap());
        assert!(!tracker.is_in_queue("psg").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_adopt_stale_marker_once() {
        let tracker = tracker();
        tracker.mark_in_queue("psg", "gone", "queue position 80").await.unwrap();
        let seen = tracker.state("psg").await.unwrap().unwrap().updated_at;
        tokio::time::advance(Duration::from_secs(600)).await;

        let hold = Duration::from_secs(120);
        assert!(tracker.adopt("psg", "exec-1", seen, hold).await.unwrap());
        assert!(!tracker.adopt("psg", "exec-2", seen, hold).await.unwrap());

        let state = tracker.state("psg").await.unwrap().unwrap();
        assert_eq!(state.owner, "exec-1");
        assert_eq!(state.position, Some(80));
        assert_eq!(
            tracker.remaining("psg").await.unwrap(),
            Some(Duration::from_secs(3000))
        );
    }

    #[tokio::test]
    async fn test_adopt_skips_refreshed_marker() {
        let tracker = tracker();
        tracker.mark_in_queue("psg", "exec-1", "virtual queue").await.unwrap();
        let seen = tracker.state("psg").await.unwrap().unwrap().updated_at;
        tokio::time::sleep(Duration::from_millis(5)).await;
        tracker.update_position("psg", Some(10), None).await.unwrap();

        assert!(!tracker
            .adopt("psg", "exec-2", seen, Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(tracker.state("psg").await.unwrap().unwrap().owner, "exec-1");
    }

    #[tokio::test]
    async fn test_clear_and_malformed_state() {
        let store = Arc::new(MemoryStore::new());
        let tracker = QueueTracker::new(QueueConfig::default(), store.clone());
        tracker.mark_in_queue("psg", "exec-1", "").await.unwrap();
        assert!(tracker.clear("psg").await.unwrap());
        assert!(!tracker.clear("psg").await.unwrap());

        store
            .put(&queue_key("psg"), "not json".to_string(), None)
            .await
            .unwrap();
        assert!(matches!(
            tracker.state("psg").await.unwrap_err(),
            QueueError::Store(StoreError::Malformed { .. })
        ));
    }
}
