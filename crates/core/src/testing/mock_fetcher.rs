//! Mock fetcher for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};

type Reply = Result<FetchResponse, FetchError>;

struct Route {
    pattern: String,
    replies: Vec<Reply>,
    served: usize,
}

impl Route {
    /// Replies in order; the last one repeats.
    fn next(&mut self) -> Reply {
        let index = self.served.min(self.replies.len().saturating_sub(1));
        self.served += 1;
        self.replies
            .get(index)
            .cloned()
            .unwrap_or_else(|| Ok(FetchResponse::ok("")))
    }
}

/// Mock implementation of the [`Fetcher`] trait.
///
/// Routes match by URL substring, first registered first. Unmatched URLs
/// get the default reply (an empty 200). Every request is recorded, and the
/// peak number of concurrent requests is tracked.
pub struct MockFetcher {
    routes: Mutex<Vec<Route>>,
    default_reply: Mutex<Reply>,
    latency: Mutex<Duration>,
    requests: Mutex<Vec<FetchRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl std::fmt::Debug for MockFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFetcher")
            .field("routes", &lock(&self.routes).len())
            .field("requests", &lock(&self.requests).len())
            .finish()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            default_reply: Mutex::new(Ok(FetchResponse::ok(""))),
            latency: Mutex::new(Duration::ZERO),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Always answer URLs containing `pattern` with `response`.
    pub fn respond(&self, pattern: &str, response: FetchResponse) {
        self.respond_sequence(pattern, vec![Ok(response)]);
    }

    /// Answer URLs containing `pattern` with each reply in turn, repeating
    /// the last. Re-registering a pattern replaces it in place.
    pub fn respond_sequence(&self, pattern: &str, replies: Vec<Result<FetchResponse, FetchError>>) {
        let mut routes = lock(&self.routes);
        let route = Route {
            pattern: pattern.to_string(),
            replies,
            served: 0,
        };
        match routes.iter_mut().find(|r| r.pattern == pattern) {
            Some(existing) => *existing = route,
            None => routes.push(route),
        }
    }

    pub fn fail(&self, pattern: &str, error: FetchError) {
        self.respond_sequence(pattern, vec![Err(error)]);
    }

    pub fn set_default(&self, reply: Result<FetchResponse, FetchError>) {
        *lock(&self.default_reply) = reply;
    }

    /// Delay every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    pub fn fetch_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn fetch_count_matching(&self, pattern: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.url.contains(pattern))
            .count()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        lock(&self.requests).clone()
    }

    /// Highest number of requests that were in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn reply_for(&self, url: &str) -> Reply {
        let mut routes = lock(&self.routes);
        match routes.iter_mut().find(|r| url.contains(&r.pattern)) {
            Some(route) => route.next(),
            None => lock(&self.default_reply).clone(),
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        lock(&self.requests).push(request.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.reply_for(&request.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routes_and_sequences() {
        let fetcher = MockFetcher::new();
        fetcher.respond_sequence(
            "/search",
            vec![
                Ok(FetchResponse::new(429, "slow down")),
                Ok(FetchResponse::ok("results")),
            ],
        );
        fetcher.fail("/down", FetchError::Timeout);

        let timeout = Duration::from_secs(1);
        let search = FetchRequest::new("https://a.test/search?q=x", timeout);
        assert_eq!(fetcher.fetch(&search).await.unwrap().status, 429);
        assert_eq!(fetcher.fetch(&search).await.unwrap().body, "results");
        assert_eq!(fetcher.fetch(&search).await.unwrap().body, "results");

        let down = FetchRequest::new("https://a.test/down", timeout);
        assert_eq!(fetcher.fetch(&down).await.unwrap_err(), FetchError::Timeout);

        let other = FetchRequest::new("https://a.test/", timeout);
        assert_eq!(fetcher.fetch(&other).await.unwrap().status, 200);

        assert_eq!(fetcher.fetch_count(), 5);
        assert_eq!(fetcher.fetch_count_matching("/search"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracks_concurrency() {
        let fetcher = MockFetcher::new();
        fetcher.set_latency(Duration::from_millis(100));
        let request = FetchRequest::new("https://a.test/", Duration::from_secs(1));

        let calls = (0..4).map(|_| fetcher.fetch(&request));
        futures::future::join_all(calls).await;
        assert_eq!(fetcher.max_in_flight(), 4);
    }
}
