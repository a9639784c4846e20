//! Shared per-platform cooldown markers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::kv::{KeyValueStore, StoreError};

pub fn cooldown_key(platform: &str) -> String {
    format!("rate_limit:{}", platform)
}

/// Why a platform is cooling down.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CooldownMarker {
    pub reason: String,
    pub set_at: DateTime<Utc>,
}

/// `rate_limit:{platform}` markers. Only the first writer within a
/// cooldown window sets the marker; later writers leave it alone.
pub struct CooldownMarkers {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for CooldownMarkers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownMarkers").finish_non_exhaustive()
    }
}

impl CooldownMarkers {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Returns whether this call set the marker.
    pub async fn mark(
        &self,
        platform: &str,
        reason: &str,
        cooldown: Duration,
    ) -> Result<bool, StoreError> {
        let marker = CooldownMarker {
            reason: reason.to_string(),
            set_at: Utc::now(),
        };
        let value = serde_json::to_string(&marker).map_err(|e| StoreError::Malformed {
            key: cooldown_key(platform),
            reason: e.to_string(),
        })?;
        let set = self
            .store
            .set_if_absent(&cooldown_key(platform), value, Some(cooldown))
            .await?;
        if set {
            info!(
                platform = %platform,
                reason = %reason,
                cooldown_secs = cooldown.as_secs(),
                "Platform cooling down"
            );
        }
        Ok(set)
    }

    /// Time left on a platform's cooldown, if it has one.
    pub async fn remaining(&self, platform: &str) -> Result<Option<Duration>, StoreError> {
        let key = cooldown_key(platform);
        if self.store.get(&key).await?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.store.ttl(&key).await?.unwrap_or_default()))
    }

    pub async fn marker(&self, platform: &str) -> Result<Option<CooldownMarker>, StoreError> {
        let key = cooldown_key(platform);
        match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Malformed {
                    key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub async fn clear(&self, platform: &str) -> Result<bool, StoreError> {
        self.store.forget(&cooldown_key(platform)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn test_first_writer_wins_and_expires() {
        let markers = CooldownMarkers::new(Arc::new(MemoryStore::new()));
        assert!(markers
            .mark("barcelona", "challenge:datadome", Duration::from_secs(180))
            .await
            .unwrap());
        assert!(!markers
            .mark("barcelona", "blocked:429", Duration::from_secs(60))
            .await
            .unwrap());

        assert_eq!(
            markers.remaining("barcelona").await.unwrap(),
            Some(Duration::from_secs(180))
        );
        assert_eq!(
            markers.marker("barcelona").await.unwrap().unwrap().reason,
            "challenge:datadome"
        );

        tokio::time::advance(Duration::from_secs(181)).await;
        assert_eq!(markers.remaining("barcelona").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear() {
        let markers = CooldownMarkers::new(Arc::new(MemoryStore::new()));
        markers.mark("psg", "blocked:403", Duration::from_secs(60)).await.unwrap();
        assert!(markers.clear("psg").await.unwrap());
        assert_eq!(markers.remaining("psg").await.unwrap(), None);
    }
}
