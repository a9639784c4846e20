//! In-process [`KeyValueStore`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{KeyValueStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Mutex-protected map with lazy expiry.
///
/// Expired entries are dropped when touched; `set_if_absent` treats them as
/// absent, so a marker can be re-acquired as soon as its TTL passes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys starting with `prefix`.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let mut keys: Vec<_> = entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|t| Instant::now() + t);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let removed = self.entries.lock().await.remove(key);
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|t| now + t),
            },
        );
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_get_forget() {
        let store = MemoryStore::new();
        store.put("a", "1".into(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));
        assert!(store.forget("a").await.unwrap());
        assert!(!store.forget("a").await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store
            .put("queue_active:psg", "x".into(), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.ttl("queue_active:psg").await.unwrap(), Some(Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.get("queue_active:psg").await.unwrap(), None);
        assert_eq!(store.ttl("queue_active:psg").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_respects_live_entries() {
        let store = MemoryStore::new();
        let ttl = Some(Duration::from_secs(10));
        assert!(store.set_if_absent("k", "first".into(), ttl).await.unwrap());
        assert!(!store.set_if_absent("k", "second".into(), ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("first".to_string()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.set_if_absent("k", "third".into(), ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_if_absent_single_winner_under_contention() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .set_if_absent("rate_limit:barcelona", i.to_string(), None)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_keys_with_prefix() {
        let store = MemoryStore::new();
        store.put("presale_watch:b", "1".into(), None).await.unwrap();
        store.put("presale_watch:a", "1".into(), None).await.unwrap();
        store.put("queue_active:a", "1".into(), None).await.unwrap();
        assert_eq!(
            store.keys_with_prefix("presale_watch:").await,
            vec!["presale_watch:a", "presale_watch:b"]
        );
    }
}
