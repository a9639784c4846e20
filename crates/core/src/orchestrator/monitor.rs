//! Recurring scrapes for high-demand events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{OrchestratorError, ScrapeReport, TicketScout};
use crate::config::WatchConfig;
use crate::kv::{KeyValueStore, StoreError};
use crate::listing::ScrapeCriteria;

/// Receives the outcome of every scheduled run, keyed by watch.
pub type WatchCallback =
    Arc<dyn Fn(&str, &Result<ScrapeReport, OrchestratorError>) + Send + Sync>;

pub fn watch_key(profile_id: &str, keyword: &str) -> String {
    format!(
        "presale_watch:{}:{}",
        profile_id,
        keyword.trim().to_lowercase()
    )
}

/// Snapshot of one active watch.
#[derive(Debug, Clone, Serialize)]
pub struct WatchInfo {
    pub key: String,
    pub keyword: String,
    pub profile_id: String,
    pub interval_secs: u64,
    pub runs: u64,
    pub started_at: DateTime<Utc>,
}

struct Watch {
    info: WatchInfo,
    runs: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

/// Re-runs scrapes on a schedule until stopped.
///
/// Each watch is claimed in the shared store first, so two monitors sharing
/// a store never poll the same event twice.
pub struct PreSaleMonitor {
    scout: Arc<TicketScout>,
    store: Arc<dyn KeyValueStore>,
    callback: Option<WatchCallback>,
    watches: Mutex<HashMap<String, Watch>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl PreSaleMonitor {
    pub fn new(scout: Arc<TicketScout>, store: Arc<dyn KeyValueStore>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            scout,
            store,
            callback: None,
            watches: Mutex::new(HashMap::new()),
            shutdown_tx,
        }
    }

    pub fn with_callback(mut self, callback: WatchCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn scout(&self) -> &Arc<TicketScout> {
        &self.scout
    }

    /// Scrape now and, when the matched profile asks for pre-sale
    /// monitoring, keep scraping at its monitoring interval.
    pub async fn scrape_and_watch(
        &self,
        criteria: &ScrapeCriteria,
        cancel: &CancellationToken,
    ) -> Result<ScrapeReport, OrchestratorError> {
        let report = self.scout.scrape(criteria, cancel).await?;
        if report.pre_sale_monitoring {
            let interval = report.monitoring_interval();
            if let Err(e) = self
                .register(criteria.clone(), &report.profile_id, interval, false)
                .await
            {
                warn!(keyword = %criteria.keyword, error = %e, "Could not register pre-sale watch");
            }
        }
        Ok(report)
    }

    /// Start the watches listed in configuration. Each runs immediately.
    pub async fn start_configured(&self, watches: &[WatchConfig]) -> usize {
        let mut started = 0;
        for watch in watches {
            let mut criteria =
                ScrapeCriteria::new(watch.keyword.clone()).with_platforms(watch.platforms.clone());
            criteria.max_price = watch.max_price;

            let profile = self.scout.classify(&criteria);
            let interval = watch.interval().unwrap_or_else(|| profile.monitoring_interval());
            let profile_id = profile.id.clone();
            match self.register(criteria, &profile_id, interval, true).await {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => warn!(keyword = %watch.keyword, error = %e, "Could not start watch"),
            }
        }
        info!(started, configured = watches.len(), "Configured watches started");
        started
    }

    /// Claim and start a watch. Returns `false` if it is already running
    /// here or in another monitor sharing the store.
    pub async fn register(
        &self,
        criteria: ScrapeCriteria,
        profile_id: &str,
        interval: Duration,
        run_immediately: bool,
    ) -> Result<bool, StoreError> {
        let key = watch_key(profile_id, &criteria.keyword);
        let mut watches = self.watches.lock().await;
        if watches.contains_key(&key) {
            return Ok(false);
        }
        if !self
            .store
            .set_if_absent(&key, criteria.keyword.clone(), None)
            .await?
        {
            debug!(key = %key, "Watch already claimed");
            return Ok(false);
        }

        let runs = Arc::new(AtomicU64::new(0));
        let task = self.spawn_watch(key.clone(), criteria.clone(), interval, run_immediately, runs.clone());
        info!(
            key = %key,
            interval_secs = interval.as_secs(),
            "Pre-sale watch registered"
        );
        watches.insert(
            key.clone(),
            Watch {
                info: WatchInfo {
                    key,
                    keyword: criteria.keyword,
                    profile_id: profile_id.to_string(),
                    interval_secs: interval.as_secs(),
                    runs: 0,
                    started_at: Utc::now(),
                },
                runs,
                task,
            },
        );
        Ok(true)
    }

    /// Stop one watch and release its claim.
    pub async fn unregister(&self, key: &str) -> bool {
        let Some(watch) = self.watches.lock().await.remove(key) else {
            return false;
        };
        watch.task.abort();
        if let Err(e) = self.store.forget(key).await {
            warn!(key = %key, error = %e, "Could not release watch claim");
        }
        info!(key = %key, "Pre-sale watch stopped");
        true
    }

    pub async fn active(&self) -> Vec<WatchInfo> {
        let watches = self.watches.lock().await;
        let mut all: Vec<_> = watches
            .values()
            .map(|w| WatchInfo {
                runs: w.runs.load(Ordering::Relaxed),
                ..w.info.clone()
            })
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// Signal every watch to stop and release all claims.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
        let watches: Vec<_> = self.watches.lock().await.drain().collect();
        for (key, watch) in watches {
            if let Err(e) = watch.task.await {
                if !e.is_cancelled() {
                    warn!(key = %key, error = %e, "Watch task failed");
                }
            }
            if let Err(e) = self.store.forget(&key).await {
                warn!(key = %key, error = %e, "Could not release watch claim");
            }
        }
        info!("Pre-sale monitor stopped");
    }

    fn spawn_watch(
        &self,
        key: String,
        criteria: ScrapeCriteria,
        interval: Duration,
        run_immediately: bool,
        runs: Arc<AtomicU64>,
    ) -> JoinHandle<()> {
        let scout = Arc::clone(&self.scout);
        let callback = self.callback.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            if !run_immediately {
                ticker.tick().await;
            }

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(key = %key, "Watch received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let cancel = CancellationToken::new();
                        let scrape = scout.scrape(&criteria, &cancel);
                        tokio::pin!(scrape);
                        let (result, stopping) = tokio::select! {
                            result = &mut scrape => (result, false),
                            _ = shutdown_rx.recv() => {
                                cancel.cancel();
                                (scrape.await, true)
                            }
                        };

                        let run = runs.fetch_add(1, Ordering::Relaxed) + 1;
                        match &result {
                            Ok(report) => info!(
                                key = %key,
                                run,
                                tickets = report.result.tickets.len(),
                                "Watch run finished"
                            ),
                            Err(e) => warn!(key = %key, run, error = %e, "Watch run failed"),
                        }
                        if let Some(callback) = &callback {
                            callback(&key, &result);
                        }
                        if stopping {
                            break;
                        }
                    }
                }
            }
        })
    }
}
