//! Token bucket rate limiting per platform.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RateLimitError {
    #[error("Rate limited on {platform}, retry after {retry_after_ms}ms")]
    RateLimited { platform: String, retry_after_ms: u64 },

    #[error("No rate limit configured for platform {0}")]
    UnknownPlatform(String),
}

/// Rate limit status for a platform.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RateLimitStatus {
    pub requests_per_minute: u32,
    pub tokens_available: f32,
    pub next_available_in_ms: Option<u64>,
}

/// Tokens refill at a constant rate and each request spends one.
///
/// The bucket starts full, so a burst up to the capacity goes out at once.
pub struct TokenBucket {
    capacity: f32,
    tokens: f32,
    /// Tokens added per second.
    refill_rate: f32,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1) as f32;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Take a token, or return how long until one is available.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f32(tokens_needed / self.refill_rate))
        }
    }

    pub fn status(&mut self) -> RateLimitStatus {
        self.refill();
        RateLimitStatus {
            requests_per_minute: self.capacity as u32,
            tokens_available: self.tokens,
            next_available_in_ms: if self.tokens >= 1.0 {
                None
            } else {
                let tokens_needed = 1.0 - self.tokens;
                Some((tokens_needed / self.refill_rate * 1000.0) as u64)
            },
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f32();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// One bucket per platform.
pub struct RateLimiterPool {
    limiters: RwLock<HashMap<String, TokenBucket>>,
}

impl std::fmt::Debug for RateLimiterPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterPool").finish_non_exhaustive()
    }
}

impl RateLimiterPool {
    /// Build from `(platform id, requests per minute)` pairs.
    pub fn new<'a, I>(platforms: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, u32)>,
    {
        let limiters = platforms
            .into_iter()
            .map(|(id, rpm)| (id.to_string(), TokenBucket::new(rpm)))
            .collect();
        Self {
            limiters: RwLock::new(limiters),
        }
    }

    pub async fn try_acquire(&self, platform: &str) -> Result<(), RateLimitError> {
        let mut limiters = self.limiters.write().await;
        match limiters.get_mut(platform) {
            Some(bucket) => bucket.try_acquire().map_err(|wait| RateLimitError::RateLimited {
                platform: platform.to_string(),
                retry_after_ms: wait.as_millis() as u64,
            }),
            None => Err(RateLimitError::UnknownPlatform(platform.to_string())),
        }
    }

    /// Wait until a token is available. Platforms without a bucket are not
    /// limited. Returns `false` if cancelled while waiting.
    pub async fn acquire(&self, platform: &str, cancel: &CancellationToken) -> bool {
        loop {
            match self.try_acquire(platform).await {
                Ok(()) | Err(RateLimitError::UnknownPlatform(_)) => return true,
                Err(RateLimitError::RateLimited { retry_after_ms, .. }) => {
                    trace!(platform = %platform, wait_ms = retry_after_ms, "Waiting for rate limit token");
                    tokio::select! {
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(Duration::from_millis(retry_after_ms.max(1))) => {}
                    }
                }
            }
        }
    }

    pub async fn get_status(&self, platform: &str) -> Option<RateLimitStatus> {
        let mut limiters = self.limiters.write().await;
        limiters.get_mut(platform).map(|bucket| bucket.status())
    }

    /// Status of every platform, sorted by id.
    pub async fn all_status(&self) -> Vec<(String, RateLimitStatus)> {
        let mut limiters = self.limiters.write().await;
        let mut all: Vec<_> = limiters
            .iter_mut()
            .map(|(name, bucket)| (name.clone(), bucket.status()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
