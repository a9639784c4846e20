//! HTTP fetch capability.

mod rate_limiter;
mod reqwest_fetcher;
mod types;

pub use rate_limiter::{RateLimitError, RateLimitStatus, RateLimiterPool, TokenBucket};
pub use reqwest_fetcher::ReqwestFetcher;
pub use types::*;

use async_trait::async_trait;

/// Issues a single HTTP GET.
///
/// Non-2xx statuses are returned as responses, not errors; only transport
/// failures produce a [`FetchError`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}
