//! Scrape orchestration across platforms.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{OrchestratorError, ScrapeReport};
use crate::config::{Config, PlatformConfig};
use crate::delay::{Delayer, HumanPacer};
use crate::demand::{DemandClassifier, DemandProfile};
use crate::executor::{
    CooldownMarkers, ExecutionContext, ExecutionOutcome, PlatformExecution, ScrapeExecutor,
};
use crate::fetch::{Fetcher, RateLimiterPool};
use crate::fingerprint::{FingerprintSynthesizer, HeaderSynthesizer};
use crate::kv::KeyValueStore;
use crate::listing::ScrapeCriteria;
use crate::merger;
use crate::metrics;
use crate::parser::ParserRegistry;
use crate::queue::{QueueBypass, QueueTracker};
use crate::session::SessionPool;
use crate::sink::TicketSink;

/// Wires a [`TicketScout`] from configuration and injected capabilities.
pub struct TicketScoutBuilder {
    config: Arc<Config>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn KeyValueStore>,
    parsers: ParserRegistry,
    delayer: Option<Arc<dyn Delayer>>,
    synthesizer: Option<Arc<dyn HeaderSynthesizer>>,
    sink: Option<Arc<dyn TicketSink>>,
    bypass: Option<Arc<dyn QueueBypass>>,
}

impl TicketScoutBuilder {
    /// Replace the seeded [`HumanPacer`].
    pub fn delayer(mut self, delayer: Arc<dyn Delayer>) -> Self {
        self.delayer = Some(delayer);
        self
    }

    pub fn synthesizer(mut self, synthesizer: Arc<dyn HeaderSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn TicketSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn bypass(mut self, bypass: Arc<dyn QueueBypass>) -> Self {
        self.bypass = Some(bypass);
        self
    }

    pub fn build(self) -> TicketScout {
        let config = self.config;
        let delayer = self
            .delayer
            .unwrap_or_else(|| Arc::new(HumanPacer::new(config.delays.clone())));
        let synthesizer = self.synthesizer.unwrap_or_else(|| {
            Arc::new(FingerprintSynthesizer::new(
                &config.fingerprint,
                &config.platforms,
            ))
        });
        let limiter = Arc::new(RateLimiterPool::new(
            config
                .platforms
                .iter()
                .map(|p| (p.id.as_str(), p.requests_per_minute)),
        ));

        let pool = Arc::new(
            SessionPool::new(
                config.sessions.clone(),
                self.fetcher.clone(),
                synthesizer,
                delayer.clone(),
            )
            .with_rate_limiter(limiter.clone()),
        );
        let queue = Arc::new(QueueTracker::new(config.queue.clone(), self.store.clone()));
        let cooldowns = Arc::new(CooldownMarkers::new(self.store.clone()));

        let mut executor = ScrapeExecutor::new(
            pool.clone(),
            self.fetcher,
            delayer,
            queue.clone(),
            cooldowns.clone(),
        )
        .with_challenges(&config.challenges)
        .with_rate_limiter(limiter.clone());
        if let Some(bypass) = self.bypass {
            executor = executor.with_bypass(bypass);
        }

        TicketScout {
            classifier: DemandClassifier::new(&config.demand, &config.strategies, &config.platforms),
            config,
            parsers: self.parsers,
            executor,
            pool,
            queue,
            cooldowns,
            limiter,
            sink: self.sink,
        }
    }
}

/// Runs scrapes for ticket searches across every relevant platform.
pub struct TicketScout {
    config: Arc<Config>,
    classifier: DemandClassifier,
    parsers: ParserRegistry,
    executor: ScrapeExecutor,
    pool: Arc<SessionPool>,
    queue: Arc<QueueTracker>,
    cooldowns: Arc<CooldownMarkers>,
    limiter: Arc<RateLimiterPool>,
    sink: Option<Arc<dyn TicketSink>>,
}

impl std::fmt::Debug for TicketScout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketScout")
            .field("parsers", &self.parsers)
            .field("persist", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl TicketScout {
    pub fn builder(
        config: Arc<Config>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn KeyValueStore>,
        parsers: ParserRegistry,
    ) -> TicketScoutBuilder {
        TicketScoutBuilder {
            config,
            fetcher,
            store,
            parsers,
            delayer: None,
            synthesizer: None,
            sink: None,
            bypass: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn classifier(&self) -> &DemandClassifier {
        &self.classifier
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn queue(&self) -> &QueueTracker {
        &self.queue
    }

    pub fn cooldowns(&self) -> &CooldownMarkers {
        &self.cooldowns
    }

    pub fn rate_limiter(&self) -> &RateLimiterPool {
        &self.limiter
    }

    /// Demand profile a search would run under.
    pub fn classify(&self, criteria: &ScrapeCriteria) -> &DemandProfile {
        self.classifier.classify(criteria)
    }

    /// Scrape every platform relevant to `criteria` and merge the results.
    ///
    /// Only configuration problems are errors. Platform failures, queues and
    /// cooldowns are reported in the result's per-platform stats, and
    /// cancellation (or the overall timeout) returns whatever was found with
    /// `cancelled` set.
    pub async fn scrape(
        &self,
        criteria: &ScrapeCriteria,
        cancel: &CancellationToken,
    ) -> Result<ScrapeReport, OrchestratorError> {
        validate_criteria(criteria)?;
        let profile = self.classifier.classify(criteria);
        let platforms = self.resolve_platforms(criteria, profile)?;

        info!(
            keyword = %criteria.keyword,
            profile = %profile.id,
            demand = %profile.demand_level,
            platforms = platforms.len(),
            "Starting scrape"
        );

        let cancel = cancel.child_token();
        let request_timeout = self.config.orchestrator.request_timeout();
        let runs = platforms.iter().copied().map(|platform| {
            let cancel = &cancel;
            async move {
                let strategy = self.classifier.select_strategy(profile, &platform.id);
                match self.cooldowns.remaining(&platform.id).await {
                    Ok(Some(remaining)) => {
                        info!(
                            platform = %platform.id,
                            remaining_secs = remaining.as_secs(),
                            "Platform cooling down, skipping"
                        );
                        metrics::EXECUTIONS
                            .with_label_values(&[
                                platform.id.as_str(),
                                ExecutionOutcome::CoolingDown.as_str(),
                            ])
                            .inc();
                        return PlatformExecution::cooling_down(
                            platform.id.clone(),
                            strategy.name,
                            remaining,
                        );
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(platform = %platform.id, error = %e, "Cooldown check failed");
                    }
                }

                // Parsers were checked while resolving platforms
                let Some(parser) = self.parsers.get(&platform.id) else {
                    return PlatformExecution::new(platform.id.clone(), strategy.name);
                };
                self.executor
                    .execute(ExecutionContext {
                        platform,
                        criteria,
                        profile,
                        strategy: &strategy,
                        parser: parser.as_ref(),
                        request_timeout,
                        cancel,
                    })
                    .await
            }
        });

        let all = join_all(runs);
        tokio::pin!(all);
        let executions = tokio::select! {
            executions = &mut all => executions,
            _ = tokio::time::sleep(self.config.orchestrator.overall_timeout()) => {
                warn!(
                    keyword = %criteria.keyword,
                    timeout_secs = self.config.orchestrator.overall_timeout().as_secs(),
                    "Scrape timed out, collecting partial results"
                );
                cancel.cancel();
                all.await
            }
        };

        let result = merger::merge(executions);
        info!(
            keyword = %criteria.keyword,
            tickets = result.tickets.len(),
            errors = result.total_errors(),
            cancelled = result.cancelled,
            "Scrape finished"
        );
        self.persist(&result.tickets);

        Ok(ScrapeReport {
            profile_id: profile.id.clone(),
            demand_level: profile.demand_level,
            pre_sale_monitoring: profile.pre_sale_monitoring,
            monitoring_interval_secs: profile.monitoring_interval().as_secs(),
            result,
        })
    }

    /// Explicit platforms must all be configured. Otherwise the profile's
    /// platforms are used, skipping unconfigured ones, or every platform
    /// when the profile names none.
    fn resolve_platforms(
        &self,
        criteria: &ScrapeCriteria,
        profile: &DemandProfile,
    ) -> Result<Vec<&PlatformConfig>, OrchestratorError> {
        let platforms: Vec<&PlatformConfig> = if !criteria.platforms.is_empty() {
            criteria
                .platforms
                .iter()
                .map(|id| {
                    self.config
                        .platform(id)
                        .ok_or_else(|| OrchestratorError::UnknownPlatform(id.clone()))
                })
                .collect::<Result<_, _>>()?
        } else if !profile.platforms.is_empty() {
            profile
                .platforms
                .iter()
                .filter_map(|id| {
                    let platform = self.config.platform(id);
                    if platform.is_none() {
                        debug!(profile = %profile.id, platform = %id, "Skipping unconfigured platform");
                    }
                    platform
                })
                .collect()
        } else {
            self.config.platforms.iter().collect()
        };

        if platforms.is_empty() {
            return Err(OrchestratorError::NoPlatforms(profile.id.clone()));
        }
        if let Some(missing) = platforms.iter().find(|p| !self.parsers.contains(&p.id)) {
            return Err(OrchestratorError::MissingParser(missing.id.clone()));
        }
        Ok(platforms)
    }

    fn persist(&self, tickets: &[crate::listing::ScrapedTicket]) {
        let Some(sink) = &self.sink else {
            return;
        };
        if !self.config.orchestrator.persist_results || tickets.is_empty() {
            return;
        }
        let sink = Arc::clone(sink);
        let tickets = tickets.to_vec();
        tokio::task::spawn_blocking(move || match sink.save_all(&tickets) {
            Ok(saved) => debug!(saved, "Persisted tickets"),
            Err(e) => warn!(error = %e, "Failed to persist tickets"),
        });
    }
}

fn validate_criteria(criteria: &ScrapeCriteria) -> Result<(), OrchestratorError> {
    if criteria.keyword.trim().is_empty() {
        return Err(OrchestratorError::InvalidCriteria(
            "keyword must not be empty".to_string(),
        ));
    }
    if let Some(max_price) = criteria.max_price {
        if !max_price.is_finite() || max_price < 0.0 {
            return Err(OrchestratorError::InvalidCriteria(format!(
                "max_price must be a non-negative number, got {}",
                max_price
            )));
        }
    }
    if let (Some(from), Some(to)) = (criteria.date_from, criteria.date_to) {
        if from > to {
            return Err(OrchestratorError::InvalidCriteria(format!(
                "date_from {} is after date_to {}",
                from, to
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchResponse;
    use crate::kv::MemoryStore;
    use crate::testing::fixtures::{event_page, test_config};
    use crate::testing::{MockFetcher, NoDelay, RecordingSink, StaticParser};
    use std::time::Duration;

    fn scout(fetcher: Arc<MockFetcher>, parsers: ParserRegistry) -> TicketScout {
        TicketScout::builder(
            Arc::new(test_config()),
            fetcher,
            Arc::new(MemoryStore::new()),
            parsers,
        )
        .delayer(Arc::new(NoDelay))
        .build()
    }

    fn all_parsers() -> ParserRegistry {
        let mut parsers = ParserRegistry::new();
        for platform in test_config().platforms {
            parsers.register(platform.id, Arc::new(StaticParser::empty()));
        }
        parsers
    }

    #[tokio::test]
    async fn test_config_errors_before_network() {
        let fetcher = Arc::new(MockFetcher::new());
        let scout = scout(fetcher.clone(), all_parsers());
        let cancel = CancellationToken::new();

        let err = scout
            .scrape(&ScrapeCriteria::new("  "), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidCriteria(_)));

        let err = scout
            .scrape(
                &ScrapeCriteria::new("Real Madrid vs Barcelona").with_platforms(["atletico"]),
                &cancel,
            )
            .await
            .unwrap_err();
        assert_eq!(err, OrchestratorError::UnknownPlatform("atletico".to_string()));

        let parsers = ParserRegistry::new().with("psg", Arc::new(StaticParser::empty()));
        let partial = TicketScout::builder(
            Arc::new(test_config()),
            fetcher.clone(),
            Arc::new(MemoryStore::new()),
            parsers,
        )
        .delayer(Arc::new(NoDelay))
        .build();
        let err = partial
            .scrape(&ScrapeCriteria::new("PSG vs Juventus").with_platforms(["psg", "juventus"]), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, OrchestratorError::MissingParser("juventus".to_string()));

        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_profile_platforms_skip_unconfigured() {
        let fetcher = Arc::new(MockFetcher::new());
        let scout = scout(fetcher, all_parsers());

        // der_klassiker lists borussia_dortmund, which is not configured
        let report = scout
            .scrape(&ScrapeCriteria::new("Der Klassiker 2026"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.profile_id, "der_klassiker");
        assert_eq!(
            report.result.platform_stats.keys().collect::<Vec<_>>(),
            vec!["bayern_munich"]
        );
    }

    #[tokio::test]
    async fn test_cooling_down_platform_is_skipped() {
        let fetcher = Arc::new(MockFetcher::new());
        let scout = scout(fetcher.clone(), all_parsers());
        scout
            .cooldowns()
            .mark("psg", "challenge:datadome", Duration::from_secs(180))
            .await
            .unwrap();

        let report = scout
            .scrape(
                &ScrapeCriteria::new("PSG vs Marseille").with_platforms(["psg"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let stats = &report.result.platform_stats["psg"];
        assert_eq!(stats.outcome, ExecutionOutcome::CoolingDown);
        assert!(stats.cooldown_remaining_secs.unwrap() > 170);
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_results_are_persisted() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(
            "q=PSG",
            FetchResponse::ok(event_page("PSG vs Marseille", "2026-03-01", 75.0, "InStock")),
        );
        let sink = Arc::new(RecordingSink::new());
        let mut parsers = ParserRegistry::new();
        parsers.register("psg", Arc::new(crate::parser::JsonLdEventParser::new()));
        let scout = TicketScout::builder(
            Arc::new(test_config()),
            fetcher,
            Arc::new(MemoryStore::new()),
            parsers,
        )
        .delayer(Arc::new(NoDelay))
        .sink(sink.clone())
        .build();

        let report = scout
            .scrape(
                &ScrapeCriteria::new("PSG vs Marseille").with_platforms(["psg"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.result.tickets.len(), 1);

        for _ in 0..100 {
            if sink.saved().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.saved()[0].title, "PSG vs Marseille");
    }
}
